//! Identity -> live connections map.
//!
//! Built on `DashMap`: every register, unregister and lookup takes the
//! shard lock for the identity, and lookups hand out copies so callers never
//! iterate the internal set while another task mutates it.

use dashmap::DashMap;
use stacks_types::identity::UserId;
use thiserror::Error;
use tracing::{debug, warn};

use super::connection::Connection;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {conn_id} belongs to user {owner}, not {requested}")]
    IdentityMismatch {
        conn_id: u64,
        owner: UserId,
        requested: UserId,
    },
}

/// Thread-safe registry of live connections, keyed by identity.
///
/// An identity may hold several connections at once (devices, tabs). An
/// identity with no connections has no entry at all.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<UserId, Vec<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to the set for `user_id`.
    ///
    /// Sibling connections are kept. Registering the same connection twice
    /// is a no-op; registering it under a different identity than the one it
    /// was created for is rejected.
    pub fn register(&self, user_id: UserId, connection: Connection) -> Result<(), RegistryError> {
        if connection.user_id() != user_id {
            warn!(
                conn_id = connection.id(),
                owner = connection.user_id(),
                requested = user_id,
                "Refusing to register connection under another identity"
            );
            return Err(RegistryError::IdentityMismatch {
                conn_id: connection.id(),
                owner: connection.user_id(),
                requested: user_id,
            });
        }

        let mut set = self.connections.entry(user_id).or_default();
        if !set.iter().any(|c| c.id() == connection.id()) {
            debug!(conn_id = connection.id(), user_id, "Connection registered");
            set.push(connection);
        }
        Ok(())
    }

    /// Remove exactly `connection` from the set for `user_id`.
    ///
    /// Returns `true` if it was registered. The identity entry is dropped
    /// once its last connection is gone.
    pub fn unregister(&self, user_id: UserId, connection: &Connection) -> bool {
        let removed = match self.connections.get_mut(&user_id) {
            Some(mut set) => {
                let before = set.len();
                set.retain(|c| c.id() != connection.id());
                set.len() != before
            }
            None => false,
        };
        self.connections.remove_if(&user_id, |_, set| set.is_empty());

        if removed {
            debug!(conn_id = connection.id(), user_id, "Connection unregistered");
        }
        removed
    }

    /// Snapshot of the live connections for `user_id`.
    pub fn connections_for(&self, user_id: UserId) -> Vec<Connection> {
        self.connections
            .get(&user_id)
            .map(|set| set.value().clone())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.connections.contains_key(&user_id)
    }

    /// Number of identities with at least one connection.
    pub fn online_count(&self) -> usize {
        self.connections.len()
    }

    /// Total number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|entry| entry.value().len()).sum()
    }

    /// Close every registered connection.
    ///
    /// Entries stay until each owning session runs its own cleanup.
    pub fn close_all(&self) {
        let all: Vec<Connection> = self
            .connections
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        for connection in all {
            connection.close();
        }
    }
}
