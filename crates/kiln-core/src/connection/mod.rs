//! Connections to runtime instances and the workloads they host.
//!
//! A [`Connection`] is the live link to one runtime API; the
//! [`ConnectionRegistry`] shares the open set across the crate. Workload
//! snapshots are cached per connection and refreshed on demand, so status
//! decisions read recent data without a network round trip.

mod client;
mod registry;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::warn;
use url::Url;

pub use client::{ClientError, HttpRuntimeClient, RuntimeClient};
pub use registry::ConnectionRegistry;

/// Reported lifecycle state of one workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AppState {
    /// The workload is coming up.
    Starting,
    /// The workload is running.
    Started,
    /// The workload is shutting down.
    Stopping,
    /// The workload exists but is not running.
    Stopped,
    /// The runtime reported no state, or one this crate does not know.
    #[default]
    #[serde(other)]
    Unknown,
}

/// One workload hosted by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Application {
    /// Workload name as shown by the runtime itself.
    pub name: String,
    /// Last reported state; `Unknown` when the runtime omits it.
    #[serde(rename = "appStatus", default)]
    pub state: AppState,
}

impl Application {
    /// Whether the workload is running or about to be.
    ///
    /// Availability gates the stop-all confirmation: stopping everything is
    /// only worth asking about while something is up.
    pub fn is_active(&self) -> bool {
        matches!(self.state, AppState::Starting | AppState::Started)
    }
}

/// Live link to one runtime instance.
///
/// Internally synchronised; refreshing and closing may happen from any
/// thread while other threads read snapshots.
pub struct Connection {
    base_url: Url,
    client: Arc<dyn RuntimeClient>,
    state: Mutex<ConnectionState>,
}

#[derive(Default)]
struct ConnectionState {
    connected: bool,
    apps: Vec<Application>,
}

impl Connection {
    /// Opens a connection by pinging the runtime once.
    pub fn open(base_url: Url, client: Arc<dyn RuntimeClient>) -> Result<Self, ClientError> {
        client.ping(&base_url)?;
        Ok(Self {
            base_url,
            client,
            state: Mutex::new(ConnectionState {
                connected: true,
                apps: Vec::new(),
            }),
        })
    }

    /// Base URL this connection talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Registry key for this connection.
    pub fn address_key(&self) -> String {
        self.base_url.as_str().to_owned()
    }

    /// Whether the last API interaction succeeded.
    pub fn is_connected(&self) -> bool {
        self.guard().connected
    }

    /// Snapshot of the most recently fetched workload list.
    pub fn applications(&self) -> Vec<Application> {
        self.guard().apps.clone()
    }

    /// Whether any cached workload is running or about to be.
    pub fn has_active_applications(&self) -> bool {
        self.guard().apps.iter().any(Application::is_active)
    }

    /// Refetches the workload list from the API.
    ///
    /// Failure marks the connection disconnected and clears the cached
    /// list instead of propagating; the next successful refresh
    /// reconnects.
    pub fn refresh_apps(&self) {
        match self.client.applications(&self.base_url) {
            Ok(apps) => {
                let mut state = self.guard();
                state.connected = true;
                state.apps = apps;
            }
            Err(error) => {
                warn!(base_url = %self.base_url, error = %error, "failed to refresh workloads");
                let mut state = self.guard();
                state.connected = false;
                state.apps.clear();
            }
        }
    }

    /// Marks the connection closed and forgets its workloads.
    pub fn close(&self) {
        let mut state = self.guard();
        state.connected = false;
        state.apps.clear();
    }

    // Plain data behind the lock; a poisoned guard carries no torn
    // invariants.
    fn guard(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
