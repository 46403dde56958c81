//! A backplane that goes nowhere.

use async_trait::async_trait;
use surge_core::{Backplane, BackplaneError, BackplaneStatus, EventEnvelope, RoomName};

/// Backplane implementation used when the backplane is disabled in config and
/// in single-process tests. Publishes are accepted and dropped; the process
/// behaves exactly like degraded single-instance mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackplane;

impl NullBackplane {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backplane for NullBackplane {
    async fn publish(&self, _room: &RoomName, _envelope: &EventEnvelope) -> Result<(), BackplaneError> {
        Ok(())
    }

    fn status(&self) -> BackplaneStatus {
        BackplaneStatus::Disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_core::EventKind;

    #[tokio::test]
    async fn test_publish_is_a_noop() {
        let backplane = NullBackplane::new();
        let room: RoomName = "market:7".parse().unwrap();
        let envelope = EventEnvelope::new(EventKind::MarketCreated, serde_json::json!({}));

        assert!(backplane.publish(&room, &envelope).await.is_ok());
        assert_eq!(backplane.status(), BackplaneStatus::Disconnected);
    }
}
