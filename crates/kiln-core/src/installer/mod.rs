//! Installer contract and the `kilnctl` implementation behind it.
//!
//! The [`Installer`] trait is the seam between lifecycle logic and the
//! external administration binary. Production code uses [`CtlInstaller`],
//! which shells out to `kilnctl`; tests substitute scripted fakes.

mod ctl;
mod process;

use std::io;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::progress::PhaseProgress;

pub use ctl::{CtlInstaller, KILNCTL_BIN_ENV};

/// Installation state of the runtime as reported by the installer.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum InstallStatus {
    /// No runtime images are present on this machine.
    #[serde(rename = "uninstalled")]
    #[strum(serialize = "uninstalled")]
    NotInstalled,
    /// An install is underway elsewhere; the runtime is not usable yet.
    Installing,
    /// Images are present but no runtime container is running.
    Stopped,
    /// The runtime is up and its API should answer.
    #[serde(rename = "started")]
    #[strum(serialize = "started")]
    Running,
    /// The installer could not be consulted or said something unparseable.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Captured result of one installer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Process exit code; `-1` when the process was killed before exiting.
    pub exit_code: i32,
    /// Captured standard output.
    pub output: String,
    /// Captured standard error.
    pub error: String,
}

impl ProcessResult {
    /// Whether the invocation exited cleanly.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Best human-readable account of a failure.
    ///
    /// Prefers standard error, falls back to standard output, and finally
    /// synthesises a message naming the exit code when both are blank.
    pub fn failure_text(&self) -> String {
        let error = self.error.trim();
        if !error.is_empty() {
            return error.to_owned();
        }
        let output = self.output.trim();
        if !output.is_empty() {
            return output.to_owned();
        }
        format!("process exited with code {}", self.exit_code)
    }
}

/// Errors raised while driving the installer binary.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// The installer binary could not be spawned at all.
    #[error("failed to launch installer '{binary}': {source}")]
    Launch {
        /// Binary that failed to launch.
        binary: Utf8PathBuf,
        /// Underlying IO failure.
        #[source]
        source: io::Error,
    },
    /// Watching the running installer process failed.
    #[error("failed to monitor installer process: {source}")]
    Monitor {
        /// Underlying IO failure.
        #[source]
        source: io::Error,
    },
    /// The installer ran past its deadline and was killed.
    #[error("installer '{command}' exceeded {timeout_secs}s and was killed")]
    Timeout {
        /// Command line that was abandoned.
        command: String,
        /// Deadline it exceeded, in seconds.
        timeout_secs: u64,
    },
    /// The status query ran but exited with a failure.
    #[error("installer status query failed: {detail}")]
    StatusFailed {
        /// Failure text taken from the process result.
        detail: String,
    },
    /// The status query succeeded but printed no parsable document.
    #[error("installer status output is not recognised: {raw:?}")]
    MalformedStatus {
        /// Output that failed to parse.
        raw: String,
    },
}

/// Operations provided by the external installer binary.
///
/// Every call is synchronous and returns once the underlying command exits.
/// Implementations must be callable from worker threads; the provided
/// [`PhaseProgress`] carries both progress reporting and the cancellation
/// token the call is expected to honour.
pub trait Installer: Send + Sync {
    /// Queries the installation state of the runtime.
    fn query_install_status(&self) -> Result<InstallStatus, InstallerError>;

    /// Downloads and prepares the runtime images.
    fn install(&self, progress: &PhaseProgress) -> Result<ProcessResult, InstallerError>;

    /// Starts the installed runtime.
    fn start(&self, progress: &PhaseProgress) -> Result<ProcessResult, InstallerError>;

    /// Stops the runtime; `stop_all` also stops workload containers.
    fn stop(&self, stop_all: bool, progress: &PhaseProgress)
    -> Result<ProcessResult, InstallerError>;

    /// Removes the runtime images.
    fn uninstall(&self, progress: &PhaseProgress) -> Result<ProcessResult, InstallerError>;
}
