//! Per-process registry of live, authenticated connections.
//!
//! A connection is owned exclusively by the process that accepted its socket;
//! entries are never shared across processes. Cross-process consistency is the
//! backplane's job, not the registry's.

use crate::room::RoomName;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

/// The authenticated identity behind a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub wallet_address: String,
}

/// A live connection's registry entry.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub connection_id: String,
    pub identity: Identity,
    pub rooms: HashSet<RoomName>,
    pub connected_at: DateTime<Utc>,
}

/// Registry statistics snapshot.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Number of live connections.
    pub connection_count: usize,
    /// Total room memberships across all connections.
    pub total_memberships: usize,
}

/// In-memory table of live connections, keyed by connection id.
///
/// Uses `DashMap` for shard-level concurrency, like the room router. Removal
/// is idempotent: transport-level disconnect detection and explicit logout may
/// both fire for the same connection.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionEntry>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection after a successful handshake.
    pub fn register(&self, connection_id: impl Into<String>, identity: Identity) {
        let connection_id = connection_id.into();
        let entry = ConnectionEntry {
            connection_id: connection_id.clone(),
            identity,
            rooms: HashSet::new(),
            connected_at: Utc::now(),
        };
        self.connections.insert(connection_id.clone(), entry);
        debug!(connection = %connection_id, "Connection registered");
    }

    /// Remove a connection. Idempotent: removing an unknown id is a no-op.
    ///
    /// Returns the rooms the connection was a member of, so the caller can
    /// detach delivery for them.
    pub fn remove(&self, connection_id: &str) -> Vec<RoomName> {
        match self.connections.remove(connection_id) {
            Some((_, entry)) => {
                debug!(connection = %connection_id, rooms = entry.rooms.len(), "Connection removed");
                entry.rooms.into_iter().collect()
            }
            None => Vec::new(),
        }
    }

    /// Record room membership for a connection.
    ///
    /// Returns `false` if the connection is not registered.
    pub fn add_room(&self, connection_id: &str, room: RoomName) -> bool {
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.rooms.insert(room);
            true
        } else {
            false
        }
    }

    /// Drop room membership. A no-op when the connection never joined the room.
    pub fn remove_room(&self, connection_id: &str, room: &RoomName) {
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.rooms.remove(room);
        }
    }

    /// Snapshot of the rooms a connection is currently a member of.
    #[must_use]
    pub fn rooms_of(&self, connection_id: &str) -> Vec<RoomName> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The identity behind a connection, if it is registered.
    #[must_use]
    pub fn identity_of(&self, connection_id: &str) -> Option<Identity> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.identity.clone())
    }

    /// Whether a connection id is currently registered.
    #[must_use]
    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            connection_count: self.connections.len(),
            total_memberships: self.connections.iter().map(|e| e.rooms.len()).sum(),
        }
    }
}
