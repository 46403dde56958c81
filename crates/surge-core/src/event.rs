//! Domain event envelope and typed payloads.
//!
//! Every delivered event is wrapped in [`EventEnvelope`] before fan-out:
//! `{ "type": "<kind>", "timestamp": "<ISO-8601>", "data": <payload> }`.
//! Callers never construct the envelope themselves; the broadcaster does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The fixed set of domain event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "market:created")]
    MarketCreated,
    #[serde(rename = "market:trade")]
    MarketTrade,
    #[serde(rename = "market:resolved")]
    MarketResolved,
    #[serde(rename = "shares:trade")]
    ShareTrade,
    #[serde(rename = "shares:unlocked")]
    SharesUnlocked,
    #[serde(rename = "dividend:available")]
    DividendAvailable,
    #[serde(rename = "notification")]
    Notification,
    #[serde(rename = "system:maintenance")]
    SystemMaintenance,
    #[serde(rename = "system:announcement")]
    SystemAnnouncement,
}

impl EventKind {
    /// The wire string for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MarketCreated => "market:created",
            EventKind::MarketTrade => "market:trade",
            EventKind::MarketResolved => "market:resolved",
            EventKind::ShareTrade => "shares:trade",
            EventKind::SharesUnlocked => "shares:unlocked",
            EventKind::DividendAvailable => "dividend:available",
            EventKind::Notification => "notification",
            EventKind::SystemMaintenance => "system:maintenance",
            EventKind::SystemAnnouncement => "system:announcement",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The wire envelope wrapped around every delivered event.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event kind (`type` on the wire).
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// When the broadcaster wrapped the payload, ISO-8601.
    pub timestamp: DateTime<Utc>,
    /// Event-specific JSON payload.
    pub data: Value,
}

impl EventEnvelope {
    /// Wrap a payload, stamping it with the current time.
    #[must_use]
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Payload for `market:created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCreated {
    pub market_id: String,
    pub creator_id: String,
    pub question: String,
}

/// Payload for `market:trade`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketTrade {
    pub market_id: String,
    /// Wallet address of the trader.
    pub trader: String,
    pub side: TradeSide,
    pub shares: f64,
    pub price: f64,
}

/// Payload for `market:resolved`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketResolved {
    pub market_id: String,
    pub outcome: String,
}

/// Payload for `shares:trade` (creator share trades).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareTrade {
    pub creator_id: String,
    pub trader: String,
    pub side: TradeSide,
    pub shares: f64,
    pub price: f64,
}

/// Payload for `shares:unlocked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharesUnlocked {
    /// Wallet address of the holder whose shares unlocked.
    pub holder: String,
    pub creator_id: String,
    pub shares: f64,
}

/// Payload for `dividend:available`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DividendAvailable {
    pub holder: String,
    pub market_id: String,
    pub amount: f64,
}

/// Payload for `notification`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Wallet address of the recipient.
    pub user_id: String,
    pub title: String,
    pub body: String,
}

/// Payload for `system:maintenance` and `system:announcement`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemNotice {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = EventEnvelope::new(EventKind::MarketTrade, json!({"marketId": "7"}));
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["type"], "market:trade");
        assert_eq!(value["data"]["marketId"], "7");
        // Timestamp serializes as an ISO-8601 string.
        let ts = value["timestamp"].as_str().unwrap();
        assert!(ts.parse::<DateTime<Utc>>().is_ok());
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = EventEnvelope::new(EventKind::Notification, json!({"title": "hi"}));
        let text = serde_json::to_string(&envelope).unwrap();
        let back: EventEnvelope = serde_json::from_str(&text).unwrap();
        assert_eq!(envelope, back);
    }

    #[test]
    fn test_kind_wire_strings() {
        assert_eq!(EventKind::SharesUnlocked.as_str(), "shares:unlocked");
        assert_eq!(
            serde_json::to_value(EventKind::SystemAnnouncement).unwrap(),
            "system:announcement"
        );
    }

    #[test]
    fn test_trade_payload_shape() {
        let trade = MarketTrade {
            market_id: "7".to_string(),
            trader: "0xABC".to_string(),
            side: TradeSide::Buy,
            shares: 10.0,
            price: 0.62,
        };
        let value = serde_json::to_value(&trade).unwrap();
        assert_eq!(value["marketId"], "7");
        assert_eq!(value["side"], "buy");
    }
}
