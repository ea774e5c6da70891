//! Configuration for the kiln tools.
//!
//! Settings resolve in layers, lowest precedence first: built-in defaults,
//! the user's configuration file, `KILN_*` environment variables, then any
//! command-line flags the caller applies on top. [`Config::load`] performs
//! the first three layers; flag handling stays with the CLI.

pub mod defaults;
pub mod policy;

use std::env;
use std::fs;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub use crate::defaults::{
    DEFAULT_BASE_URL, DEFAULT_INSTALLER_BIN, DEFAULT_LOG_FILTER, DEFAULT_OPERATION_TIMEOUT_SECS,
    DEFAULT_STATUS_TIMEOUT_SECS, default_base_url,
};
pub use crate::policy::{LogFormat, PolicyParseError, StopPolicy};

/// Errors raised while loading or merging configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read configuration file {path}")]
    Read {
        /// Path of the file that failed to read.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON of the expected shape.
    #[error("failed to parse configuration file {path}")]
    Parse {
        /// Path of the file that failed to parse.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// An override supplied a base URL that does not parse.
    #[error("invalid base URL {value:?}")]
    InvalidUrl {
        /// The rejected text.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: url::ParseError,
    },
    /// An override supplied an unknown policy or format name.
    #[error("invalid value {value:?} for {setting}")]
    InvalidName {
        /// Name of the setting being overridden.
        setting: &'static str,
        /// The rejected text.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: PolicyParseError,
    },
    /// An override supplied a timeout that is not a whole number of seconds.
    #[error("invalid value {value:?} for {setting}")]
    InvalidNumber {
        /// Name of the setting being overridden.
        setting: &'static str,
        /// The rejected text.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: ParseIntError,
    },
}

/// Resolved settings shared by the lifecycle manager and the CLI.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the local runtime's HTTP API.
    pub base_url: Url,
    /// Explicit path to the installer binary; resolved from `PATH` when
    /// unset.
    pub installer_bin: Option<Utf8PathBuf>,
    /// Workload handling during uninstall; see [`StopPolicy`].
    pub stop_policy: StopPolicy,
    /// Seconds a status query may take before it is abandoned.
    pub status_timeout_secs: u64,
    /// Seconds a lifecycle operation may take before it is abandoned.
    pub operation_timeout_secs: u64,
    /// Filter directive for diagnostic logging.
    pub log_filter: String,
    /// Encoding for diagnostic logging.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            installer_bin: None,
            stop_policy: StopPolicy::default(),
            status_timeout_secs: DEFAULT_STATUS_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: LogFormat::default(),
        }
    }
}

/// Partial configuration as written in the file; only present keys override.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    base_url: Option<Url>,
    installer_bin: Option<Utf8PathBuf>,
    stop_policy: Option<StopPolicy>,
    status_timeout_secs: Option<u64>,
    operation_timeout_secs: Option<u64>,
    log_filter: Option<String>,
    log_format: Option<LogFormat>,
}

impl Config {
    /// Loads configuration from the default file location and the
    /// environment.
    ///
    /// A missing file is not an error; a present but unreadable or malformed
    /// one is.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = default_config_path()
            && path.exists()
        {
            config.merge_file(&path)?;
        }
        config.apply_env_pairs(env::vars())?;
        Ok(config)
    }

    /// Loads configuration from an explicit file, skipping the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge_file(path)?;
        Ok(config)
    }

    /// Timeout applied to installer status queries.
    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    /// Timeout applied to install, start, stop, and uninstall commands.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let file: ConfigFile = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        if let Some(installer_bin) = file.installer_bin {
            self.installer_bin = Some(installer_bin);
        }
        if let Some(stop_policy) = file.stop_policy {
            self.stop_policy = stop_policy;
        }
        if let Some(secs) = file.status_timeout_secs {
            self.status_timeout_secs = secs;
        }
        if let Some(secs) = file.operation_timeout_secs {
            self.operation_timeout_secs = secs;
        }
        if let Some(log_filter) = file.log_filter {
            self.log_filter = log_filter;
        }
        if let Some(log_format) = file.log_format {
            self.log_format = log_format;
        }
        Ok(())
    }

    /// Applies `KILN_*` overrides from an iterator of environment pairs.
    ///
    /// Unrelated keys and empty values are ignored so that exported but
    /// blank variables behave as unset.
    fn apply_env_pairs<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "KILN_BASE_URL" => {
                    self.base_url =
                        Url::parse(&value).map_err(|source| ConfigError::InvalidUrl {
                            value: value.clone(),
                            source,
                        })?;
                }
                "KILN_INSTALLER_BIN" => {
                    self.installer_bin = Some(Utf8PathBuf::from(value));
                }
                "KILN_STOP_POLICY" => {
                    self.stop_policy =
                        StopPolicy::from_str(&value).map_err(|source| ConfigError::InvalidName {
                            setting: "stop policy",
                            value: value.clone(),
                            source,
                        })?;
                }
                "KILN_STATUS_TIMEOUT_SECS" => {
                    self.status_timeout_secs = parse_secs("status timeout", &value)?;
                }
                "KILN_OPERATION_TIMEOUT_SECS" => {
                    self.operation_timeout_secs = parse_secs("operation timeout", &value)?;
                }
                "KILN_LOG_FILTER" => {
                    self.log_filter = value;
                }
                "KILN_LOG_FORMAT" => {
                    self.log_format =
                        LogFormat::from_str(&value).map_err(|source| ConfigError::InvalidName {
                            setting: "log format",
                            value: value.clone(),
                            source,
                        })?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Location of the user's configuration file, when a home directory exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("kiln").join("config.json"))
}

fn parse_secs(setting: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|source| ConfigError::InvalidNumber {
        setting,
        value: value.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rstest::rstest;
    use tempfile::NamedTempFile;

    use super::*;

    fn config_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create temp config");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn defaults_match_constants() {
        let config = Config::default();
        assert_eq!(config.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(config.installer_bin, None);
        assert_eq!(config.stop_policy, StopPolicy::Prompt);
        assert_eq!(config.status_timeout(), Duration::from_secs(60));
        assert_eq!(config.operation_timeout(), Duration::from_secs(1800));
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn file_overrides_only_present_keys() {
        let file = config_file(r#"{"stop_policy": "never", "operation_timeout_secs": 90}"#);
        let config = Config::load_from(file.path()).expect("load config");
        assert_eq!(config.stop_policy, StopPolicy::Never);
        assert_eq!(config.operation_timeout_secs, 90);
        assert_eq!(config.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(config.status_timeout_secs, DEFAULT_STATUS_TIMEOUT_SECS);
    }

    #[test]
    fn file_sets_installer_bin_and_url() {
        let file = config_file(
            r#"{"base_url": "http://localhost:10100/", "installer_bin": "/opt/kiln/kilnctl"}"#,
        );
        let config = Config::load_from(file.path()).expect("load config");
        assert_eq!(config.base_url.as_str(), "http://localhost:10100/");
        assert_eq!(
            config.installer_bin.as_deref(),
            Some(camino::Utf8Path::new("/opt/kiln/kilnctl"))
        );
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load_from(Path::new("/nonexistent/kiln/config.json"))
            .expect_err("missing file must fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let file = config_file("{not json");
        let err = Config::load_from(file.path()).expect_err("bad JSON must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_file_values() {
        let file = config_file(r#"{"stop_policy": "never", "log_filter": "debug"}"#);
        let mut config = Config::load_from(file.path()).expect("load config");
        config
            .apply_env_pairs(pairs(&[
                ("KILN_STOP_POLICY", "always"),
                ("KILN_LOG_FORMAT", "json"),
            ]))
            .expect("apply env");
        assert_eq!(config.stop_policy, StopPolicy::Always);
        assert_eq!(config.log_format, LogFormat::Json);
        // Untouched by the environment, so the file value survives.
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn env_sets_every_supported_key() {
        let mut config = Config::default();
        config
            .apply_env_pairs(pairs(&[
                ("KILN_BASE_URL", "http://localhost:9191/"),
                ("KILN_INSTALLER_BIN", "/usr/local/bin/kilnctl"),
                ("KILN_STOP_POLICY", "never"),
                ("KILN_STATUS_TIMEOUT_SECS", "5"),
                ("KILN_OPERATION_TIMEOUT_SECS", "120"),
                ("KILN_LOG_FILTER", "kiln=trace"),
                ("KILN_LOG_FORMAT", "json"),
            ]))
            .expect("apply env");
        assert_eq!(config.base_url.as_str(), "http://localhost:9191/");
        assert_eq!(
            config.installer_bin.as_deref(),
            Some(camino::Utf8Path::new("/usr/local/bin/kilnctl"))
        );
        assert_eq!(config.stop_policy, StopPolicy::Never);
        assert_eq!(config.status_timeout_secs, 5);
        assert_eq!(config.operation_timeout_secs, 120);
        assert_eq!(config.log_filter, "kiln=trace");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[rstest]
    #[case("KILN_BASE_URL", "not a url")]
    #[case("KILN_STOP_POLICY", "sometimes")]
    #[case("KILN_STATUS_TIMEOUT_SECS", "fast")]
    #[case("KILN_LOG_FORMAT", "yaml")]
    fn env_rejects_malformed_values(#[case] key: &str, #[case] value: &str) {
        let mut config = Config::default();
        assert!(config.apply_env_pairs(pairs(&[(key, value)])).is_err());
    }

    #[test]
    fn env_ignores_unrelated_and_empty_keys() {
        let mut config = Config::default();
        config
            .apply_env_pairs(pairs(&[
                ("PATH", "/usr/bin"),
                ("KILN_STOP_POLICY", ""),
                ("KILNCTL_BIN", "/bin/kilnctl"),
            ]))
            .expect("apply env");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn default_config_path_ends_with_kiln_config() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("kiln/config.json"));
        }
    }
}
