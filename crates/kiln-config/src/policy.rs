//! Behavioural policies selectable through configuration.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Error returned when parsing a policy name from text.
pub type PolicyParseError = strum::ParseError;

/// How an uninstall should treat user workloads that the runtime still hosts.
///
/// Stopping the runtime with `stop --all` also stops every workload container,
/// so the policy decides whether workloads are fair game or must be asked
/// about first.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
    ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StopPolicy {
    /// Always stop every container, workloads included, without asking.
    Always,
    /// Only ever stop the runtime's own containers.
    Never,
    /// Ask before stopping workload containers; skip the question when no
    /// workload is running.
    #[default]
    Prompt,
}

/// Output encoding for diagnostic logs.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
    ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Human-readable single-line records.
    #[default]
    Text,
    /// One JSON object per record, for log shippers.
    Json,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("always", StopPolicy::Always)]
    #[case("never", StopPolicy::Never)]
    #[case("prompt", StopPolicy::Prompt)]
    #[case("PROMPT", StopPolicy::Prompt)]
    fn stop_policy_parses_case_insensitively(#[case] text: &str, #[case] expected: StopPolicy) {
        assert_eq!(<StopPolicy as FromStr>::from_str(text).unwrap(), expected);
    }

    #[test]
    fn stop_policy_rejects_unknown_names() {
        assert!(<StopPolicy as FromStr>::from_str("sometimes").is_err());
    }

    #[rstest]
    #[case(StopPolicy::Always, "always")]
    #[case(StopPolicy::Prompt, "prompt")]
    fn stop_policy_displays_snake_case(#[case] policy: StopPolicy, #[case] expected: &str) {
        assert_eq!(policy.to_string(), expected);
    }

    #[rstest]
    #[case("text", LogFormat::Text)]
    #[case("json", LogFormat::Json)]
    #[case("Json", LogFormat::Json)]
    fn log_format_parses(#[case] text: &str, #[case] expected: LogFormat) {
        assert_eq!(<LogFormat as FromStr>::from_str(text).unwrap(), expected);
    }

    #[test]
    fn defaults_are_prompt_and_text() {
        assert_eq!(StopPolicy::default(), StopPolicy::Prompt);
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }
}
