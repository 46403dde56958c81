//! Control-message dispatch.
//!
//! An explicit match over the message kind, kept free of any transport so
//! subscription semantics can be unit-tested without a live socket. The
//! connection loop applies the outcome (spawning or aborting forwarding
//! tasks) and writes the reply.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use surge_core::{EventEnvelope, RoomKind, RoomName, RoomRouter};
use surge_protocol::{ClientMessage, ServerMessage};
use tokio::sync::broadcast;

/// What the connection loop must do after handling a client message.
pub enum DispatchOutcome {
    /// Send the reply; nothing else changes.
    Reply(ServerMessage),

    /// The connection joined a room: start forwarding from `receiver`,
    /// then send the reply.
    Subscribed {
        reply: ServerMessage,
        room: RoomName,
        receiver: broadcast::Receiver<Arc<EventEnvelope>>,
    },

    /// The connection left a room: stop forwarding for it, then send the
    /// reply.
    Unsubscribed { reply: ServerMessage, room: RoomName },
}

impl DispatchOutcome {
    /// The reply to write to the client.
    #[must_use]
    pub fn reply(&self) -> &ServerMessage {
        match self {
            DispatchOutcome::Reply(reply)
            | DispatchOutcome::Subscribed { reply, .. }
            | DispatchOutcome::Unsubscribed { reply, .. } => reply,
        }
    }
}

/// Wall-clock time in epoch milliseconds.
fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Handle one client control message for an authenticated connection.
///
/// Failures are structured `{success: false}` replies, never errors: the
/// connection stays open.
pub fn handle_client_message(
    router: &RoomRouter,
    connection_id: &str,
    msg: ClientMessage,
) -> DispatchOutcome {
    match msg {
        ClientMessage::Subscribe { room, id } => {
            let kind: RoomKind = match room.parse() {
                Ok(kind) => kind,
                Err(_) => {
                    return DispatchOutcome::Reply(ServerMessage::subscribe_failed(format!(
                        "unknown room kind: {room}"
                    )))
                }
            };

            match router.subscribe(connection_id, kind, &id) {
                Ok((room, receiver)) => DispatchOutcome::Subscribed {
                    reply: ServerMessage::subscribed(room.as_str()),
                    room,
                    receiver,
                },
                Err(e) => DispatchOutcome::Reply(ServerMessage::subscribe_failed(e.to_string())),
            }
        }

        ClientMessage::Unsubscribe { room, id } => {
            let kind: RoomKind = match room.parse() {
                Ok(kind) => kind,
                Err(_) => {
                    return DispatchOutcome::Reply(ServerMessage::unsubscribe_failed(format!(
                        "unknown room kind: {room}"
                    )))
                }
            };

            match router.unsubscribe(connection_id, kind, &id) {
                Ok(room) => DispatchOutcome::Unsubscribed {
                    reply: ServerMessage::unsubscribed(room.as_str()),
                    room,
                },
                Err(e) => DispatchOutcome::Reply(ServerMessage::unsubscribe_failed(e.to_string())),
            }
        }

        ClientMessage::GetRooms => {
            let rooms = router
                .rooms(connection_id)
                .into_iter()
                .map(String::from)
                .collect();
            DispatchOutcome::Reply(ServerMessage::Rooms { rooms })
        }

        ClientMessage::Ping => DispatchOutcome::Reply(ServerMessage::pong(epoch_ms())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_core::{ConnectionRegistry, Identity};
    use surge_protocol::SubscriptionReply;

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

    fn subscribe(room: &str, id: &str) -> ClientMessage {
        ClientMessage::Subscribe {
            room: room.to_string(),
            id: id.to_string(),
        }
    }

    fn expect_reply(outcome: &DispatchOutcome) -> &SubscriptionReply {
        match outcome.reply() {
            ServerMessage::Subscribed(reply) | ServerMessage::Unsubscribed(reply) => reply,
            other => panic!("expected subscription reply, got {other:?}"),
        }
    }

    #[test]
    fn test_subscribe_resolves_canonical_room() {
        let (_registry, router) = setup();
        let outcome = handle_client_message(&router, "conn-1", subscribe("market", "7"));

        let reply = expect_reply(&outcome);
        assert!(reply.success);
        assert_eq!(reply.room.as_deref(), Some("market:7"));
        assert!(matches!(outcome, DispatchOutcome::Subscribed { .. }));
    }

    #[test]
    fn test_subscribe_unknown_kind_fails_structurally() {
        let (_registry, router) = setup();
        let outcome = handle_client_message(&router, "conn-1", subscribe("lobby", "1"));

        let reply = expect_reply(&outcome);
        assert!(!reply.success);
        assert!(matches!(outcome, DispatchOutcome::Reply(_)));
    }

    #[test]
    fn test_subscribe_foreign_user_room_refused() {
        let (_registry, router) = setup();
        let outcome = handle_client_message(&router, "conn-1", subscribe("user", "0xDEF"));

        let reply = expect_reply(&outcome);
        assert!(!reply.success);
    }

    #[test]
    fn test_unsubscribe_non_member_succeeds() {
        let (_registry, router) = setup();
        let outcome = handle_client_message(
            &router,
            "conn-1",
            ClientMessage::Unsubscribe {
                room: "market".to_string(),
                id: "42".to_string(),
            },
        );

        let reply = expect_reply(&outcome);
        assert!(reply.success);
        assert_eq!(reply.room.as_deref(), Some("market:42"));
    }

    #[test]
    fn test_get_rooms_snapshot() {
        let (_registry, router) = setup();
        handle_client_message(&router, "conn-1", subscribe("market", "7"));
        handle_client_message(&router, "conn-1", subscribe("creator", "alice"));

        let outcome = handle_client_message(&router, "conn-1", ClientMessage::GetRooms);
        match outcome.reply() {
            ServerMessage::Rooms { rooms } => {
                let mut rooms = rooms.clone();
                rooms.sort();
                assert_eq!(rooms, vec!["creator:alice", "market:7"]);
            }
            other => panic!("expected rooms reply, got {other:?}"),
        }
    }

    #[test]
    fn test_subscribe_then_unsubscribe_net_effect() {
        let (_registry, router) = setup();
        handle_client_message(&router, "conn-1", subscribe("market", "7"));
        handle_client_message(
            &router,
            "conn-1",
            ClientMessage::Unsubscribe {
                room: "market".to_string(),
                id: "7".to_string(),
            },
        );

        let outcome = handle_client_message(&router, "conn-1", ClientMessage::GetRooms);
        match outcome.reply() {
            ServerMessage::Rooms { rooms } => assert!(rooms.is_empty()),
            other => panic!("expected rooms reply, got {other:?}"),
        }
    }

    #[test]
    fn test_ping_pong() {
        let (_registry, router) = setup();
        let outcome = handle_client_message(&router, "conn-1", ClientMessage::Ping);

        match outcome.reply() {
            ServerMessage::Pong { pong, timestamp } => {
                assert!(*pong);
                assert!(*timestamp > 0);
            }
            other => panic!("expected pong, got {other:?}"),
        }
    }
}
