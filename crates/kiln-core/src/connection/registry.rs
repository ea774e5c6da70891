//! Registry of open connections.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::Connection;

/// Shared, internally synchronised set of connections keyed by address.
///
/// The registry never calls back into the lifecycle manager, so it may be
/// used freely while manager state is locked.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    entries: Arc<Mutex<Vec<Arc<Connection>>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection, replacing any entry with the same key.
    pub fn add(&self, connection: Arc<Connection>) {
        let key = connection.address_key();
        let mut entries = self.guard();
        entries.retain(|existing| existing.address_key() != key);
        entries.push(connection);
    }

    /// Removes the connection with `address_key`, closing it on the way
    /// out.
    pub fn remove(&self, address_key: &str) -> Option<Arc<Connection>> {
        let connection = {
            let mut entries = self.guard();
            let index = entries
                .iter()
                .position(|connection| connection.address_key() == address_key)?;
            entries.remove(index)
        };
        connection.close();
        Some(connection)
    }

    /// Snapshot of every registered connection.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.guard().clone()
    }

    /// Connections whose last API interaction succeeded.
    pub fn active_connections(&self) -> Vec<Arc<Connection>> {
        self.guard()
            .iter()
            .filter(|connection| connection.is_connected())
            .cloned()
            .collect()
    }

    /// Refreshes the workload list on every connection.
    ///
    /// Works from a snapshot so no network call runs under the registry
    /// lock.
    pub fn refresh_all(&self) {
        for connection in self.connections() {
            connection.refresh_apps();
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Arc<Connection>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
