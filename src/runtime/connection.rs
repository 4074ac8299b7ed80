//! Client connections and the registry of active sessions.
//!
//! A `ClientConnection` owns the accepted stream. The registry only keeps a
//! `ClientInfo` copy for enumeration, and the `Registration` handle carried by
//! the connection removes that copy when dropped. Membership therefore tracks
//! the lifetime of the stream on every exit path, panics included.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use slab::Slab;
use std::net::SocketAddr;
use std::sync::Arc;

/// Registry slot identifying one active connection.
pub type ConnectionId = usize;

/// Enumerable facts about an active connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// One accepted socket, owned by its session.
pub struct ClientConnection<S> {
    pub stream: S,
    pub registration: Registration,
}

impl<S> ClientConnection<S> {
    pub fn new(stream: S, registration: Registration) -> Self {
        Self {
            stream,
            registration,
        }
    }

    pub fn info(&self) -> &ClientInfo {
        &self.registration.info
    }
}

/// Registry of active connections using slab allocation.
///
/// Safe to share between the acceptor and every session task.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<Slab<ClientInfo>>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert a new connection. The entry lives as long as the returned
    /// handle.
    pub fn register(self: &Arc<Self>, addr: SocketAddr) -> Registration {
        let mut connections = self.connections.lock();
        let entry = connections.vacant_entry();
        let info = ClientInfo {
            id: entry.key(),
            addr,
            connected_at: Utc::now(),
        };
        entry.insert(info.clone());

        Registration {
            registry: Arc::clone(self),
            info,
        }
    }

    fn remove(&self, id: ConnectionId) -> Option<ClientInfo> {
        self.connections.lock().try_remove(id)
    }

    /// Get a copy of a connection's info.
    #[cfg(test)]
    pub fn get(&self, id: ConnectionId) -> Option<ClientInfo> {
        self.connections.lock().get(id).cloned()
    }

    /// Check if a connection exists.
    #[cfg(test)]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().contains(id)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Check if there are no connections.
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Copy of all active connections, ordered by id.
    pub fn snapshot(&self) -> Vec<ClientInfo> {
        self.connections
            .lock()
            .iter()
            .map(|(_, info)| info.clone())
            .collect()
    }
}

/// Registry membership of one connection. Dropping it unregisters.
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    info: ClientInfo,
}

impl Registration {
    pub fn info(&self) -> &ClientInfo {
        &self.info
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.info.id);
    }
}
