//! Installer implementation backed by the `kilnctl` binary.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use kiln_config::{Config, DEFAULT_INSTALLER_BIN};
use serde::Deserialize;
use tracing::warn;

use super::process::{CommandSpec, run_command};
use super::{InstallStatus, Installer, InstallerError, ProcessResult};
use crate::progress::PhaseProgress;

/// Environment variable naming the installer binary, ahead of
/// configuration.
pub const KILNCTL_BIN_ENV: &str = "KILNCTL_BIN";

/// Drives the `kilnctl` administration binary.
///
/// Status queries run under the short status timeout; everything else runs
/// under the operation timeout, which must allow for image downloads.
pub struct CtlInstaller {
    binary: Utf8PathBuf,
    status_timeout: Duration,
    operation_timeout: Duration,
}

impl CtlInstaller {
    /// Creates an installer invoking `binary` with the given timeouts.
    pub fn new(binary: Utf8PathBuf, status_timeout: Duration, operation_timeout: Duration) -> Self {
        Self {
            binary,
            status_timeout,
            operation_timeout,
        }
    }

    /// Creates an installer from configuration, honouring the `KILNCTL_BIN`
    /// environment override.
    pub fn from_config(config: &Config) -> Self {
        let binary = resolve_binary(env::var(KILNCTL_BIN_ENV).ok(), config.installer_bin.clone());
        Self::new(binary, config.status_timeout(), config.operation_timeout())
    }

    /// Binary this installer invokes.
    pub fn binary(&self) -> &Utf8Path {
        &self.binary
    }

    fn run(
        &self,
        args: &[&str],
        progress: &PhaseProgress,
    ) -> Result<ProcessResult, InstallerError> {
        let spec = CommandSpec {
            binary: &self.binary,
            args,
            timeout: self.operation_timeout,
        };
        run_command(&spec, progress)
    }
}

impl Installer for CtlInstaller {
    fn query_install_status(&self) -> Result<InstallStatus, InstallerError> {
        let spec = CommandSpec {
            binary: &self.binary,
            args: &["status", "--json"],
            timeout: self.status_timeout,
        };
        let result = run_command(&spec, &PhaseProgress::detached())?;
        if !result.success() {
            return Err(InstallerError::StatusFailed {
                detail: result.failure_text(),
            });
        }
        parse_status(&result.output)
    }

    fn install(&self, progress: &PhaseProgress) -> Result<ProcessResult, InstallerError> {
        self.run(&["install"], progress)
    }

    fn start(&self, progress: &PhaseProgress) -> Result<ProcessResult, InstallerError> {
        self.run(&["start"], progress)
    }

    fn stop(
        &self,
        stop_all: bool,
        progress: &PhaseProgress,
    ) -> Result<ProcessResult, InstallerError> {
        let args: &[&str] = if stop_all { &["stop", "--all"] } else { &["stop"] };
        self.run(args, progress)
    }

    fn uninstall(&self, progress: &PhaseProgress) -> Result<ProcessResult, InstallerError> {
        self.run(&["remove"], progress)
    }
}

/// Picks the installer binary: environment override first, configuration
/// second, the bare name resolved from `PATH` last.
fn resolve_binary(env_override: Option<String>, configured: Option<Utf8PathBuf>) -> Utf8PathBuf {
    if let Some(path) = env_override
        && !path.is_empty()
    {
        return Utf8PathBuf::from(path);
    }
    configured.unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_INSTALLER_BIN))
}

#[derive(Deserialize)]
struct StatusDocument {
    status: String,
}

/// Parses `kilnctl status --json` output.
///
/// The document is taken from the last non-blank stdout line so notices
/// printed ahead of it do not break parsing. Unrecognised labels degrade to
/// `Unknown` with a warning.
fn parse_status(output: &str) -> Result<InstallStatus, InstallerError> {
    let line = output
        .lines()
        .map(str::trim)
        .rev()
        .find(|line| !line.is_empty())
        .ok_or_else(|| InstallerError::MalformedStatus {
            raw: output.to_owned(),
        })?;
    let document: StatusDocument =
        serde_json::from_str(line).map_err(|_| InstallerError::MalformedStatus {
            raw: line.to_owned(),
        })?;
    match InstallStatus::from_str(&document.status) {
        Ok(status) => Ok(status),
        Err(_) => {
            warn!(label = %document.status, "installer reported an unknown status label");
            Ok(InstallStatus::Unknown)
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn env_override_beats_configuration() {
        let binary = resolve_binary(
            Some(String::from("/opt/test/kilnctl")),
            Some(Utf8PathBuf::from("/etc/kiln/kilnctl")),
        );
        assert_eq!(binary, Utf8PathBuf::from("/opt/test/kilnctl"));
    }

    #[test]
    fn blank_env_override_is_ignored() {
        let binary = resolve_binary(
            Some(String::new()),
            Some(Utf8PathBuf::from("/etc/kiln/kilnctl")),
        );
        assert_eq!(binary, Utf8PathBuf::from("/etc/kiln/kilnctl"));
    }

    #[test]
    fn default_binary_comes_from_path() {
        assert_eq!(
            resolve_binary(None, None),
            Utf8PathBuf::from(DEFAULT_INSTALLER_BIN)
        );
    }

    #[rstest]
    #[case(r#"{"status": "stopped"}"#, InstallStatus::Stopped)]
    #[case(r#"{"status": "started"}"#, InstallStatus::Running)]
    #[case(r#"{"status": "uninstalled"}"#, InstallStatus::NotInstalled)]
    #[case(r#"{"status": "installing"}"#, InstallStatus::Installing)]
    fn parses_status_documents(#[case] output: &str, #[case] expected: InstallStatus) {
        assert_eq!(parse_status(output).unwrap(), expected);
    }

    #[test]
    fn last_non_blank_line_wins() {
        let output = "a newer kilnctl is available\n\n{\"status\": \"started\"}\n";
        assert_eq!(parse_status(output).unwrap(), InstallStatus::Running);
    }

    #[test]
    fn unknown_labels_degrade_to_unknown() {
        let output = r#"{"status": "hibernating"}"#;
        assert_eq!(parse_status(output).unwrap(), InstallStatus::Unknown);
    }

    #[rstest]
    #[case("")]
    #[case("   \n\t\n")]
    #[case("plain text, no document")]
    #[case(r#"{"other": "shape"}"#)]
    fn undocumented_output_is_malformed(#[case] output: &str) {
        assert!(matches!(
            parse_status(output),
            Err(InstallerError::MalformedStatus { .. })
        ));
    }

    #[cfg(unix)]
    mod unix {
        use std::fs;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        use tempfile::TempDir;

        use super::*;

        /// Writes an executable fake `kilnctl` into `dir`.
        fn fake_kilnctl(dir: &TempDir, body: &str) -> Utf8PathBuf {
            let path = dir.path().join("kilnctl");
            let mut file = fs::File::create(&path).expect("create fake kilnctl");
            writeln!(file, "#!/bin/sh\n{body}").expect("write fake kilnctl");
            drop(file);
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .expect("mark fake kilnctl executable");
            Utf8PathBuf::from_path_buf(path).expect("utf-8 temp path")
        }

        fn installer(binary: Utf8PathBuf) -> CtlInstaller {
            CtlInstaller::new(binary, Duration::from_secs(5), Duration::from_secs(5))
        }

        #[test]
        fn status_query_round_trips_through_a_real_process() {
            let dir = TempDir::new().expect("temp dir");
            let binary = fake_kilnctl(&dir, r#"echo '{"status": "stopped"}'"#);
            let status = installer(binary).query_install_status().expect("status");
            assert_eq!(status, InstallStatus::Stopped);
        }

        #[test]
        fn failing_status_query_reports_the_exit_code() {
            let status = installer(Utf8PathBuf::from("/bin/false")).query_install_status();
            match status {
                Err(InstallerError::StatusFailed { detail }) => {
                    assert!(detail.contains('1'), "missing exit code: {detail}");
                }
                other => panic!("expected StatusFailed, got {other:?}"),
            }
        }
    }
}
