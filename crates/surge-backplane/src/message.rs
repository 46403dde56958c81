//! Backplane wire message.

use serde::{Deserialize, Serialize};
use surge_core::{EventEnvelope, RoomName};

/// The message published onto the shared backplane channel.
///
/// Carries the origin instance id so a process can drop its own messages:
/// local delivery already ran before the backplane publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackplaneMessage {
    /// Instance id of the publishing process.
    pub origin: String,
    /// Canonical room name the envelope is addressed to.
    pub room: String,
    /// The full event envelope, ready for local delivery.
    pub envelope: EventEnvelope,
}

/// A decoded event received from a peer process.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub room: RoomName,
    pub envelope: EventEnvelope,
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_core::EventKind;

    #[test]
    fn test_roundtrip() {
        let msg = BackplaneMessage {
            origin: "surge-1234-deadbeef".to_string(),
            room: "market:7".to_string(),
            envelope: EventEnvelope::new(EventKind::MarketTrade, serde_json::json!({"a": 1})),
        };

        let text = serde_json::to_string(&msg).unwrap();
        let back: BackplaneMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(msg, back);
    }
}
