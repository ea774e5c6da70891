//! Scheduling and supervision of lifecycle operations.
//!
//! One operation runs at a time. [`LifecycleOperations`] claims the
//! manager's activity slot, spawns a named worker thread for the flow, and
//! hands back an [`OperationHandle`] the caller can poll, cancel, or join.

mod flows;
mod outcome;

pub use outcome::{OperationError, Outcome};

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use kiln_config::StopPolicy;
use tracing::{debug, warn};

use crate::installer::{InstallStatus, Installer};
use crate::manager::{Activity, LifecycleManager, OperationKind};
use crate::progress::{CancelToken, ProgressSink, TaskProgress};

/// Answer to the stop-scope prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    /// Stop the runtime and every workload container.
    StopAll,
    /// Stop only the runtime containers.
    RuntimeOnly,
    /// Abandon the stop without running the installer.
    Cancelled,
}

/// Asks the user whether a stop should take workloads down too.
///
/// Consulted only under [`StopPolicy::Prompt`] and only while workloads
/// are active. Runs on the operation's worker thread.
pub trait StopPrompter: Send + Sync {
    /// Invoked before the stop phase starts.
    fn confirm_stop_all(&self) -> StopDecision;
}

impl<T: StopPrompter> StopPrompter for Arc<T> {
    fn confirm_stop_all(&self) -> StopDecision {
        self.as_ref().confirm_stop_all()
    }
}

/// A running lifecycle operation.
///
/// Dropping the handle does not stop the worker; the operation keeps
/// running to its terminal outcome.
#[derive(Debug)]
pub struct OperationHandle {
    kind: OperationKind,
    cancel: CancelToken,
    join: JoinHandle<Outcome>,
}

impl OperationHandle {
    /// Which operation this handle tracks.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Requests cooperative cancellation of the running operation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token shared with the worker; useful for wiring external triggers.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the worker thread has reached its terminal outcome.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the worker and returns its outcome.
    pub fn join(self) -> Outcome {
        self.join
            .join()
            .unwrap_or(Outcome::Failed(OperationError::Panicked))
    }
}

/// Schedules lifecycle operations against a shared [`LifecycleManager`].
pub struct LifecycleOperations {
    manager: Arc<LifecycleManager>,
    installer: Arc<dyn Installer>,
    stop_policy: StopPolicy,
    prompter: Arc<dyn StopPrompter>,
}

impl LifecycleOperations {
    /// Creates a scheduler sharing the manager's installer.
    pub fn new(
        manager: Arc<LifecycleManager>,
        installer: Arc<dyn Installer>,
        stop_policy: StopPolicy,
        prompter: Arc<dyn StopPrompter>,
    ) -> Self {
        Self {
            manager,
            installer,
            stop_policy,
            prompter,
        }
    }

    /// Installs the runtime and starts it.
    pub fn install(&self, sink: Arc<dyn ProgressSink>) -> Result<OperationHandle, OperationError> {
        self.schedule(OperationKind::Install, sink)
    }

    /// Starts an installed runtime.
    pub fn start(&self, sink: Arc<dyn ProgressSink>) -> Result<OperationHandle, OperationError> {
        self.schedule(OperationKind::Start, sink)
    }

    /// Stops the runtime, honouring the configured stop policy.
    pub fn stop(&self, sink: Arc<dyn ProgressSink>) -> Result<OperationHandle, OperationError> {
        self.schedule(OperationKind::Stop, sink)
    }

    /// Removes the runtime, stopping it first when it is running.
    pub fn uninstall(
        &self,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<OperationHandle, OperationError> {
        self.schedule(OperationKind::Uninstall, sink)
    }

    fn schedule(
        &self,
        kind: OperationKind,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<OperationHandle, OperationError> {
        self.manager
            .try_begin(kind)
            .map_err(|active| OperationError::Busy { active })?;
        let cancel = CancelToken::new();
        let mut progress = TaskProgress::new(&kind.to_string(), sink, cancel.clone());
        let worker = Worker {
            manager: Arc::clone(&self.manager),
            installer: Arc::clone(&self.installer),
            stop_policy: self.stop_policy,
            prompter: Arc::clone(&self.prompter),
        };
        match thread::Builder::new()
            .name(kind.thread_name().to_owned())
            .spawn(move || worker.run(kind, &mut progress))
        {
            Ok(join) => Ok(OperationHandle { kind, cancel, join }),
            Err(source) => {
                // The claim stands but no worker exists; release it.
                self.manager.set_activity(Activity::Idle);
                Err(OperationError::Spawn { source })
            }
        }
    }
}

struct Worker {
    manager: Arc<LifecycleManager>,
    installer: Arc<dyn Installer>,
    stop_policy: StopPolicy,
    prompter: Arc<dyn StopPrompter>,
}

impl Worker {
    fn run(&self, kind: OperationKind, progress: &mut TaskProgress) -> Outcome {
        debug!(operation = %kind, "operation started");
        let outcome = {
            // Reset activity even when a flow panics; the claim must not
            // outlive the worker.
            let _guard = ActivityGuard {
                manager: Arc::clone(&self.manager),
            };
            self.dispatch(kind, progress)
        };
        let status = self.manager.install_status(true);
        if outcome.is_success() && status == InstallStatus::Running {
            self.manager.create_local_connection();
            self.manager.refresh_all();
        }
        match &outcome {
            Outcome::Success => debug!(operation = %kind, "operation succeeded"),
            Outcome::Cancelled => debug!(operation = %kind, "operation cancelled"),
            Outcome::Failed(error) => {
                warn!(operation = %kind, error = %error, "operation failed");
            }
        }
        outcome
    }

    fn dispatch(&self, kind: OperationKind, progress: &mut TaskProgress) -> Outcome {
        match kind {
            OperationKind::Install => flows::run_install(self.installer.as_ref(), progress),
            OperationKind::Start => flows::run_start(self.installer.as_ref(), progress),
            OperationKind::Stop => flows::run_stop(
                self.manager.as_ref(),
                self.installer.as_ref(),
                self.stop_policy,
                self.prompter.as_ref(),
                progress,
            ),
            OperationKind::Uninstall => flows::run_uninstall(self.installer.as_ref(), progress),
        }
    }
}

struct ActivityGuard {
    manager: Arc<LifecycleManager>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.manager.set_activity(Activity::Idle);
    }
}
