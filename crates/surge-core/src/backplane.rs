//! The cross-process publish/subscribe seam.
//!
//! Every server process publishes its locally-originated events through a
//! [`Backplane`] so peer processes can re-run local delivery against their own
//! registries. The concrete Redis adapter lives in the `surge-backplane`
//! crate; this trait keeps the broadcaster free of any transport dependency.

use crate::event::EventEnvelope;
use crate::room::RoomName;
use async_trait::async_trait;
use thiserror::Error;

/// Backplane errors.
#[derive(Debug, Error)]
pub enum BackplaneError {
    /// The backplane is not connected (degraded single-instance mode).
    #[error("Backplane unavailable")]
    Unavailable,

    /// Envelope could not be serialized.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The publish did not complete within the configured timeout.
    #[error("Backplane request timed out")]
    Timeout,

    /// Transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Connection state of the backplane.
///
/// `Disconnected → Connecting → Ready`, with `Reconnecting` after a transient
/// failure. There is no permanent failure state while the process lives:
/// reconnection retries forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackplaneStatus {
    Disconnected,
    Connecting,
    Ready,
    Reconnecting,
}

impl BackplaneStatus {
    /// Lowercase label, as reported by the health endpoint.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BackplaneStatus::Disconnected => "disconnected",
            BackplaneStatus::Connecting => "connecting",
            BackplaneStatus::Ready => "ready",
            BackplaneStatus::Reconnecting => "reconnecting",
        }
    }
}

/// A cross-process publish channel for room-addressed events.
#[async_trait]
pub trait Backplane: Send + Sync {
    /// Publish an envelope addressed to a room, for delivery on every peer
    /// process.
    ///
    /// # Errors
    ///
    /// Returns an error if the backplane is unavailable or the publish fails;
    /// callers treat this as a logged, non-fatal condition.
    async fn publish(&self, room: &RoomName, envelope: &EventEnvelope) -> Result<(), BackplaneError>;

    /// Current connection state.
    fn status(&self) -> BackplaneStatus;
}
