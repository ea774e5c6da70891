//! Central state for the local runtime.
//!
//! The [`LifecycleManager`] owns the cached installation status, the
//! operation-in-progress marker, and the single tracked local connection.
//! Long-running work lives in [`crate::operations`]; the manager only
//! holds state, keeps it consistent, and tells listeners when it changed.
//!
//! Locking discipline: the internal mutex covers every read-modify-write
//! of manager state, installer queries and connection opening run outside
//! it, and listeners are always notified after the lock is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strum::Display;
use tracing::{info, warn};
use url::Url;

use crate::connection::{Connection, ConnectionRegistry, RuntimeClient};
use crate::events::{ChangeListener, ListenerSet};
use crate::installer::{InstallStatus, Installer};

/// Kind of lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OperationKind {
    /// Download the runtime images and start the runtime.
    Install,
    /// Start the installed runtime.
    Start,
    /// Stop the runtime, optionally with its workloads.
    Stop,
    /// Stop if needed, then remove the runtime images.
    Uninstall,
}

impl OperationKind {
    /// Sentence shown when refusing to begin another operation.
    pub fn describe_busy(self) -> &'static str {
        match self {
            Self::Install | Self::Start => "the runtime is currently installing or starting",
            Self::Stop | Self::Uninstall => "the runtime is currently uninstalling or stopping",
        }
    }

    /// Name given to the operation's worker thread.
    pub(crate) fn thread_name(self) -> &'static str {
        match self {
            Self::Install => "kiln-install",
            Self::Start => "kiln-start",
            Self::Stop => "kiln-stop",
            Self::Uninstall => "kiln-uninstall",
        }
    }
}

/// Whether an operation currently holds the manager.
///
/// While `Busy`, the activity supersedes the cached installation status
/// for anything user-facing; `Idle` means the status is authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Activity {
    /// No operation is running.
    #[default]
    Idle,
    /// The named operation is running.
    Busy(OperationKind),
}

impl Activity {
    /// Whether an operation is running.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Busy(kind) => write!(f, "{kind}"),
        }
    }
}

#[derive(Default)]
struct ManagerState {
    /// `None` until the installer has been consulted once.
    install_status: Option<InstallStatus>,
    activity: Activity,
    local: Option<Arc<Connection>>,
}

/// Owns runtime state and the single local connection.
pub struct LifecycleManager {
    installer: Arc<dyn Installer>,
    client: Arc<dyn RuntimeClient>,
    registry: ConnectionRegistry,
    base_url: Url,
    state: Mutex<ManagerState>,
    listeners: ListenerSet,
}

impl LifecycleManager {
    /// Creates a manager for the runtime at `base_url` with an empty
    /// registry.
    pub fn new(
        installer: Arc<dyn Installer>,
        client: Arc<dyn RuntimeClient>,
        base_url: Url,
    ) -> Self {
        Self {
            installer,
            client,
            registry: ConnectionRegistry::new(),
            base_url,
            state: Mutex::new(ManagerState::default()),
            listeners: ListenerSet::default(),
        }
    }

    /// Primes manager state at startup.
    ///
    /// Queries the installer and, when the runtime is already running,
    /// opens the local connection and fetches its workloads.
    pub fn bootstrap(&self) {
        let status = self.install_status(true);
        info!(status = %status, "runtime status at startup");
        if status == InstallStatus::Running {
            self.create_local_connection();
            self.refresh_all();
        }
    }

    /// Current installation status.
    ///
    /// Returns the cached value unless `refresh` is set or nothing has
    /// been cached yet. Fails closed: installer errors are logged and
    /// reported as [`InstallStatus::Unknown`], never propagated. A
    /// refresh that lands on anything but `Running` tears down the local
    /// connection.
    pub fn install_status(&self, refresh: bool) -> InstallStatus {
        if !refresh && let Some(status) = self.guard().install_status {
            return status;
        }
        self.refresh_install_status()
    }

    /// Operation-in-progress marker.
    pub fn activity(&self) -> Activity {
        self.guard().activity
    }

    /// The tracked local connection, when one is open.
    pub fn local_connection(&self) -> Option<Arc<Connection>> {
        self.guard().local.clone()
    }

    /// Opens the local connection if none exists yet.
    ///
    /// Idempotent: an existing connection is returned as-is. Returns
    /// `None` with a log line when the runtime does not answer; callers
    /// treat that as "not connected right now", not as an error.
    pub fn create_local_connection(&self) -> Option<Arc<Connection>> {
        if let Some(existing) = self.guard().local.as_ref() {
            return Some(Arc::clone(existing));
        }
        let opened = match Connection::open(self.base_url.clone(), Arc::clone(&self.client)) {
            Ok(connection) => Arc::new(connection),
            Err(error) => {
                warn!(base_url = %self.base_url, error = %error, "local connection could not be opened");
                return None;
            }
        };
        let connection = {
            let mut state = self.guard();
            match state.local.as_ref() {
                // Lost a race with another creator; keep the first one.
                Some(existing) => Arc::clone(existing),
                None => {
                    state.local = Some(Arc::clone(&opened));
                    self.registry.add(Arc::clone(&opened));
                    opened
                }
            }
        };
        self.listeners.notify();
        Some(connection)
    }

    /// Closes and deregisters the local connection; a no-op when absent.
    pub fn remove_local_connection(&self) {
        let Some(connection) = self.guard().local.take() else {
            return;
        };
        if self.registry.remove(&connection.address_key()).is_none() {
            connection.close();
        }
        self.listeners.notify();
    }

    /// Refreshes the workload list on every registered connection.
    pub fn refresh_all(&self) {
        self.registry.refresh_all();
        self.listeners.notify();
    }

    /// Whether any registered connection hosts an available workload.
    pub fn has_active_applications(&self) -> bool {
        self.registry
            .connections()
            .iter()
            .any(|connection| connection.has_active_applications())
    }

    /// Registers a listener for state changes.
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.add(listener);
    }

    /// Registry shared with this manager.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Base URL of the local runtime.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Atomically claims the manager for `kind`.
    ///
    /// Returns the active operation when one is already running, leaving
    /// state untouched.
    pub(crate) fn try_begin(&self, kind: OperationKind) -> Result<(), OperationKind> {
        {
            let mut state = self.guard();
            if let Activity::Busy(active) = state.activity {
                return Err(active);
            }
            state.activity = Activity::Busy(kind);
        }
        self.listeners.notify();
        Ok(())
    }

    /// Overwrites the activity marker and notifies listeners.
    pub(crate) fn set_activity(&self, activity: Activity) {
        self.guard().activity = activity;
        self.listeners.notify();
    }

    fn refresh_install_status(&self) -> InstallStatus {
        // Query outside the state lock; the installer may take seconds.
        let queried = match self.installer.query_install_status() {
            Ok(status) => status,
            Err(error) => {
                warn!(error = %error, "install status query failed");
                InstallStatus::Unknown
            }
        };
        let (changed, torn_down) = {
            let mut state = self.guard();
            let changed = state.install_status != Some(queried);
            state.install_status = Some(queried);
            let torn_down = if queried == InstallStatus::Running {
                None
            } else {
                state.local.take()
            };
            (changed, torn_down)
        };
        let tore_down = torn_down.is_some();
        if let Some(connection) = torn_down
            && self.registry.remove(&connection.address_key()).is_none()
        {
            connection.close();
        }
        if changed || tore_down {
            self.listeners.notify();
        }
        queried
    }

    // Plain data behind the lock; a poisoned guard carries no torn
    // invariants, and activity resets must succeed after a worker panic.
    fn guard(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
