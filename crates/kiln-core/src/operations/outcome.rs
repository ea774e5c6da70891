//! Terminal results of lifecycle operations.

use std::io;

use thiserror::Error;

use crate::installer::InstallerError;
use crate::manager::OperationKind;

/// How a finished operation ended.
///
/// Cancellation is deliberately not a failure: the caller asked for it
/// and cleanup already ran.
#[derive(Debug)]
pub enum Outcome {
    /// Every phase completed and the installer reported success.
    Success,
    /// A cancellation request was observed; later phases never ran.
    Cancelled,
    /// The operation failed; the error says how.
    Failed(OperationError),
}

impl Outcome {
    /// Whether every phase completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Errors surfaced by lifecycle operations.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Another operation already holds the manager.
    #[error("{}", .active.describe_busy())]
    Busy {
        /// The operation currently running.
        active: OperationKind,
    },
    /// The installer could not be driven at all.
    #[error(transparent)]
    Installer(#[from] InstallerError),
    /// The installer ran and reported failure.
    #[error("{action} failed: {message}")]
    CommandFailed {
        /// Which installer action failed.
        action: &'static str,
        /// Failure text classified from the process result.
        message: String,
    },
    /// The worker thread could not be spawned.
    #[error("failed to spawn operation thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    /// The worker thread panicked; manager state was still reset.
    #[error("operation thread panicked")]
    Panicked,
}
