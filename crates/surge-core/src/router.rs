//! Room router: subscription management and local fan-out.
//!
//! The router owns the per-room broadcast channels for this process and keeps
//! the connection registry's membership view in sync. It never talks to other
//! processes; the backplane replays remote publishes into [`RoomRouter::publish`].

use crate::event::EventEnvelope;
use crate::registry::ConnectionRegistry;
use crate::room::{RoomKind, RoomName};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Default per-room broadcast capacity.
const DEFAULT_ROOM_CAPACITY: usize = 1024;

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Malformed (kind, id) pair.
    #[error("Invalid room: {0}")]
    InvalidRoom(&'static str),

    /// A user room may only be joined by its own user.
    #[error("Not allowed to join {0}")]
    Forbidden(String),

    /// The connection is not registered. Unauthenticated callers never reach
    /// the router, so this indicates a lifecycle bug, not a client error.
    #[error("Connection not registered: {0}")]
    NotRegistered(String),

    /// Maximum subscriptions reached.
    #[error("Maximum subscriptions reached")]
    MaxSubscriptionsReached,
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum subscriptions per connection.
    pub max_subscriptions_per_connection: usize,
    /// Per-room broadcast capacity.
    pub room_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_subscriptions_per_connection: 100,
            room_capacity: DEFAULT_ROOM_CAPACITY,
        }
    }
}

/// A room's broadcast channel plus its local subscriber set.
struct RoomEntry {
    sender: tokio::sync::broadcast::Sender<Arc<EventEnvelope>>,
    subscribers: HashSet<String>,
}

impl RoomEntry {
    fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self {
            sender,
            subscribers: HashSet::new(),
        }
    }
}

/// Router statistics snapshot.
#[derive(Debug, Clone)]
pub struct RouterStats {
    /// Number of rooms with at least one local subscriber.
    pub room_count: usize,
}

/// The per-process room router.
pub struct RoomRouter {
    rooms: DashMap<RoomName, RoomEntry>,
    registry: Arc<ConnectionRegistry>,
    config: RouterConfig,
}

impl RoomRouter {
    /// Create a router with default configuration.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self::with_config(registry, RouterConfig::default())
    }

    /// Create a router with custom configuration.
    #[must_use]
    pub fn with_config(registry: Arc<ConnectionRegistry>, config: RouterConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            registry,
            config,
        }
    }

    /// Subscribe a registered connection to a room.
    ///
    /// Returns the canonical room name and a receiver for events addressed to
    /// it. Subscribing to a room the connection already belongs to succeeds
    /// and returns a fresh receiver; the caller is expected to replace the old
    /// one so the connection still receives each event once.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed room, an unregistered connection, a
    /// foreign `user:*` room, or an exceeded subscription limit.
    pub fn subscribe(
        &self,
        connection_id: &str,
        kind: RoomKind,
        id: &str,
    ) -> Result<(RoomName, tokio::sync::broadcast::Receiver<Arc<EventEnvelope>>), RouterError> {
        let identity = self
            .registry
            .identity_of(connection_id)
            .ok_or_else(|| RouterError::NotRegistered(connection_id.to_string()))?;

        let room = RoomName::new(kind, id).map_err(RouterError::InvalidRoom)?;

        // A user room carries account-scoped events (dividends, unlocks,
        // notifications); only the matching authenticated wallet may join it.
        if kind == RoomKind::User && !id.eq_ignore_ascii_case(&identity.wallet_address) {
            return Err(RouterError::Forbidden(room.to_string()));
        }

        let current = self.registry.rooms_of(connection_id);
        let already_member = current.contains(&room);
        if !already_member && current.len() >= self.config.max_subscriptions_per_connection {
            return Err(RouterError::MaxSubscriptionsReached);
        }

        let mut entry = self
            .rooms
            .entry(room.clone())
            .or_insert_with(|| RoomEntry::new(self.config.room_capacity));

        entry.subscribers.insert(connection_id.to_string());
        let receiver = entry.sender.subscribe();
        drop(entry);

        self.registry.add_room(connection_id, room.clone());

        debug!(
            room = %room,
            connection = %connection_id,
            "Subscribed"
        );

        Ok((room, receiver))
    }

    /// Unsubscribe a connection from a room.
    ///
    /// Unsubscribing from a room the connection never joined is a harmless
    /// no-op; the canonical room name is still returned.
    ///
    /// # Errors
    ///
    /// Returns an error only for a malformed (kind, id) pair.
    pub fn unsubscribe(
        &self,
        connection_id: &str,
        kind: RoomKind,
        id: &str,
    ) -> Result<RoomName, RouterError> {
        let room = RoomName::new(kind, id).map_err(RouterError::InvalidRoom)?;
        self.registry.remove_room(connection_id, &room);
        self.detach(connection_id, &room);
        debug!(room = %room, connection = %connection_id, "Unsubscribed");
        Ok(room)
    }

    /// Detach a connection from every room and drop its registry entry.
    ///
    /// Idempotent: safe to call for an already-removed connection.
    pub fn disconnect(&self, connection_id: &str) {
        let rooms = self.registry.remove(connection_id);
        for room in &rooms {
            self.detach(connection_id, room);
        }
        if !rooms.is_empty() {
            debug!(connection = %connection_id, rooms = rooms.len(), "Detached from all rooms");
        }
    }

    /// Snapshot of the rooms a connection is currently a member of.
    #[must_use]
    pub fn rooms(&self, connection_id: &str) -> Vec<RoomName> {
        self.registry.rooms_of(connection_id)
    }

    /// Deliver an envelope to every local member of a room.
    ///
    /// Returns the number of local receivers. Publishing to a room with no
    /// local members is a zero-recipient no-op, never an error.
    pub fn publish(&self, room: &RoomName, envelope: Arc<EventEnvelope>) -> usize {
        if let Some(entry) = self.rooms.get(room) {
            let count = entry.sender.send(envelope).unwrap_or_default();
            trace!(room = %room, recipients = count, "Published event");
            count
        } else {
            trace!(room = %room, "No local members");
            0
        }
    }

    /// Whether any local connection is subscribed to a room.
    #[must_use]
    pub fn room_exists(&self, room: &RoomName) -> bool {
        self.rooms.contains_key(room)
    }

    /// The number of local subscribers in a room.
    #[must_use]
    pub fn subscriber_count(&self, room: &RoomName) -> usize {
        self.rooms
            .get(room)
            .map(|e| e.subscribers.len())
            .unwrap_or(0)
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            room_count: self.rooms.len(),
        }
    }

    /// Remove a connection from a room's subscriber set, deleting the room
    /// when the last local subscriber leaves.
    fn detach(&self, connection_id: &str, room: &RoomName) {
        if let Some(mut entry) = self.rooms.get_mut(room) {
            entry.subscribers.remove(connection_id);
            if entry.subscribers.is_empty() {
                drop(entry); // Release the lock
                self.rooms.remove(room);
                debug!(room = %room, "Deleted empty room");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::registry::Identity;
    use serde_json::json;

    fn setup() -> (Arc<ConnectionRegistry>, RoomRouter) {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = RoomRouter::new(registry.clone());
        registry.register(
            "conn-1",
            Identity {
                user_id: "u1".to_string(),
                wallet_address: "0xABC".to_string(),
            },
        );
        (registry, router)
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let (registry, router) = setup();

        let (room, _rx) = router.subscribe("conn-1", RoomKind::Market, "7").unwrap();
        assert_eq!(room.as_str(), "market:7");
        assert!(router.room_exists(&room));
        assert_eq!(router.subscriber_count(&room), 1);
        assert_eq!(registry.rooms_of("conn-1"), vec![room.clone()]);

        router.unsubscribe("conn-1", RoomKind::Market, "7").unwrap();
        assert!(registry.rooms_of("conn-1").is_empty());
        // Room is auto-deleted with its last subscriber.
        assert!(!router.room_exists(&room));
        assert_eq!(router.subscriber_count(&room), 0);
    }

    #[test]
    fn test_unsubscribe_never_joined_is_noop() {
        let (_registry, router) = setup();
        let room = router.unsubscribe("conn-1", RoomKind::Market, "9").unwrap();
        assert_eq!(room.as_str(), "market:9");
    }

    #[test]
    fn test_unregistered_connection_rejected() {
        let (_registry, router) = setup();
        assert!(matches!(
            router.subscribe("ghost", RoomKind::Market, "7"),
            Err(RouterError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_user_room_restricted_to_own_wallet() {
        let (_registry, router) = setup();

        // Own user room: allowed, case-insensitive.
        assert!(router.subscribe("conn-1", RoomKind::User, "0xabc").is_ok());

        // Someone else's user room: refused.
        assert!(matches!(
            router.subscribe("conn-1", RoomKind::User, "0xDEF"),
            Err(RouterError::Forbidden(_))
        ));
    }

    #[test]
    fn test_invalid_room_id() {
        let (_registry, router) = setup();
        assert!(matches!(
            router.subscribe("conn-1", RoomKind::Market, ""),
            Err(RouterError::InvalidRoom(_))
        ));
    }

    #[test]
    fn test_max_subscriptions() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = RoomRouter::with_config(
            registry.clone(),
            RouterConfig {
                max_subscriptions_per_connection: 2,
                room_capacity: 8,
            },
        );
        registry.register(
            "conn-1",
            Identity {
                user_id: "u1".to_string(),
                wallet_address: "0xABC".to_string(),
            },
        );

        router.subscribe("conn-1", RoomKind::Market, "1").unwrap();
        router.subscribe("conn-1", RoomKind::Market, "2").unwrap();
        assert!(matches!(
            router.subscribe("conn-1", RoomKind::Market, "3"),
            Err(RouterError::MaxSubscriptionsReached)
        ));

        // Re-subscribing to a held room is not a new membership.
        assert!(router.subscribe("conn-1", RoomKind::Market, "2").is_ok());
    }

    #[tokio::test]
    async fn test_publish_reaches_members() {
        let (_registry, router) = setup();
        let (room, mut rx) = router.subscribe("conn-1", RoomKind::Market, "7").unwrap();

        let envelope = Arc::new(EventEnvelope::new(
            EventKind::MarketTrade,
            json!({"marketId": "7"}),
        ));
        let count = router.publish(&room, envelope.clone());
        assert_eq!(count, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, EventKind::MarketTrade);
    }

    #[test]
    fn test_publish_no_members_is_noop() {
        let (_registry, router) = setup();
        let room = RoomName::new(RoomKind::Market, "99").unwrap();
        let envelope = Arc::new(EventEnvelope::new(EventKind::MarketCreated, json!({})));
        assert_eq!(router.publish(&room, envelope), 0);
    }

    #[tokio::test]
    async fn test_disconnect_stops_delivery() {
        let (registry, router) = setup();
        let (room, _rx) = router.subscribe("conn-1", RoomKind::Market, "7").unwrap();

        router.disconnect("conn-1");
        assert!(!registry.contains("conn-1"));

        // Broadcasting to the old room does not error and reaches nobody.
        let envelope = Arc::new(EventEnvelope::new(EventKind::MarketTrade, json!({})));
        assert_eq!(router.publish(&room, envelope), 0);

        // Second disconnect is a no-op.
        router.disconnect("conn-1");
    }
}
