//! Lifecycle management for the Kiln local development runtime.
//!
//! The crate tracks one runtime per machine: [`LifecycleManager`] caches the
//! installer-reported [`InstallStatus`], owns the tracked local
//! [`Connection`], and keeps a [`ConnectionRegistry`] of every runtime the
//! process talks to. [`LifecycleOperations`] layers the long-running work on
//! top, running install, start, stop, and uninstall one at a time on named
//! worker threads with weighted progress reporting and cooperative
//! cancellation.
//!
//! Production code drives the external `kilnctl` binary through
//! [`CtlInstaller`] and reaches the runtime's HTTP API through
//! [`HttpRuntimeClient`]; both sit behind traits so tests can substitute
//! scripted stand-ins.

mod connection;
mod events;
mod installer;
mod manager;
mod operations;
mod progress;

pub use connection::{
    AppState, Application, ClientError, Connection, ConnectionRegistry, HttpRuntimeClient,
    RuntimeClient,
};
pub use events::ChangeListener;
pub use installer::{
    CtlInstaller, InstallStatus, Installer, InstallerError, KILNCTL_BIN_ENV, ProcessResult,
};
pub use manager::{Activity, LifecycleManager, OperationKind};
pub use operations::{
    LifecycleOperations, OperationError, OperationHandle, Outcome, StopDecision, StopPrompter,
};
pub use progress::{CancelToken, NullSink, PhaseProgress, ProgressSink, TaskProgress};

#[cfg(test)]
mod tests;
