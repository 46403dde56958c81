//! Control message types exchanged over the socket.
//!
//! Messages are JSON objects tagged by a `type` field.

use serde::{Deserialize, Serialize};

/// A control message sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Join a room.
    #[serde(rename = "subscribe")]
    Subscribe {
        /// Room kind (`market`, `creator`, `user`, `global`).
        room: String,
        /// Entity id within the kind.
        id: String,
    },

    /// Leave a room.
    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        /// Room kind.
        room: String,
        /// Entity id within the kind.
        id: String,
    },

    /// Request the current room membership snapshot.
    #[serde(rename = "getRooms")]
    GetRooms,

    /// Application-level keepalive.
    #[serde(rename = "ping")]
    Ping,
}

/// Outcome of a subscribe or unsubscribe request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionReply {
    pub success: bool,
    /// The canonical `kind:id` room name the request resolved to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    pub message: String,
}

/// A control message sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Welcome acknowledgment after a successful handshake.
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: String,
        /// Rooms the connection was auto-subscribed to.
        rooms: Vec<String>,
    },

    /// Reply to a subscribe request.
    #[serde(rename = "subscribed")]
    Subscribed(SubscriptionReply),

    /// Reply to an unsubscribe request.
    #[serde(rename = "unsubscribed")]
    Unsubscribed(SubscriptionReply),

    /// Reply to a getRooms request.
    #[serde(rename = "rooms")]
    Rooms { rooms: Vec<String> },

    /// Reply to an application-level ping.
    #[serde(rename = "pong")]
    Pong {
        pong: bool,
        /// Server wall clock, epoch milliseconds.
        timestamp: u64,
    },

    /// Terminal or per-request error.
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    /// Create a welcome acknowledgment.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, rooms: Vec<String>) -> Self {
        ServerMessage::Connected {
            connection_id: connection_id.into(),
            rooms,
        }
    }

    /// Create a successful subscribe reply.
    #[must_use]
    pub fn subscribed(room: impl Into<String>) -> Self {
        ServerMessage::Subscribed(SubscriptionReply {
            success: true,
            room: Some(room.into()),
            message: "subscribed".to_string(),
        })
    }

    /// Create a failed subscribe reply.
    #[must_use]
    pub fn subscribe_failed(message: impl Into<String>) -> Self {
        ServerMessage::Subscribed(SubscriptionReply {
            success: false,
            room: None,
            message: message.into(),
        })
    }

    /// Create a successful unsubscribe reply.
    #[must_use]
    pub fn unsubscribed(room: impl Into<String>) -> Self {
        ServerMessage::Unsubscribed(SubscriptionReply {
            success: true,
            room: Some(room.into()),
            message: "unsubscribed".to_string(),
        })
    }

    /// Create a failed unsubscribe reply.
    #[must_use]
    pub fn unsubscribe_failed(message: impl Into<String>) -> Self {
        ServerMessage::Unsubscribed(SubscriptionReply {
            success: false,
            room: None,
            message: message.into(),
        })
    }

    /// Create a pong reply.
    #[must_use]
    pub fn pong(timestamp: u64) -> Self {
        ServerMessage::Pong {
            pong: true,
            timestamp,
        }
    }

    /// Create an error message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_tags() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","room":"market","id":"7"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                room: "market".to_string(),
                id: "7".to_string(),
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"getRooms"}"#).unwrap();
        assert_eq!(msg, ClientMessage::GetRooms);

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"publish"}"#).is_err());
    }

    #[test]
    fn test_subscription_reply_shape() {
        let reply = ServerMessage::subscribed("market:7");
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["type"], "subscribed");
        assert_eq!(value["success"], true);
        assert_eq!(value["room"], "market:7");

        let reply = ServerMessage::subscribe_failed("not allowed");
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["success"], false);
        assert!(value.get("room").is_none());
    }

    #[test]
    fn test_pong_shape() {
        let value = serde_json::to_value(ServerMessage::pong(1700000000000)).unwrap();
        assert_eq!(value["pong"], true);
        assert_eq!(value["timestamp"], 1700000000000u64);
    }

    #[test]
    fn test_connected_shape() {
        let value = serde_json::to_value(ServerMessage::connected(
            "conn-1",
            vec!["user:0xABC".to_string(), "global:all".to_string()],
        ))
        .unwrap();
        assert_eq!(value["connectionId"], "conn-1");
        assert_eq!(value["rooms"][1], "global:all");
    }
}
