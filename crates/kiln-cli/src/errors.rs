//! Error types for the CLI runtime.
//!
//! Command-level failures are rendered where they happen; only setup
//! failures that abort the run before a command executes travel through
//! [`AppError`].

use thiserror::Error;

use kiln_config::ConfigError;
use kiln_core::{ClientError, OperationError};

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Operation(#[from] OperationError),
}
