//! # surge-core
//!
//! Core types and room-based fan-out for the Surge event-distribution layer.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Room** - Canonical `kind:id` channel names grouping interested connections
//! - **ConnectionRegistry** - Per-process table of live, authenticated connections
//! - **RoomRouter** - Subscribe/unsubscribe and local pub/sub delivery
//! - **EventBroadcaster** - Domain-facing API mapping typed events to rooms
//! - **Backplane** - Trait for the cross-process publish/subscribe channel
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Broadcaster │────▶│ RoomRouter  │────▶│    Room     │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │  Backplane  │  (other processes re-run local delivery)
//! └─────────────┘
//! ```

pub mod backplane;
pub mod broadcaster;
pub mod event;
pub mod registry;
pub mod room;
pub mod router;

pub use backplane::{Backplane, BackplaneError, BackplaneStatus};
pub use broadcaster::EventBroadcaster;
pub use event::{EventEnvelope, EventKind};
pub use registry::{ConnectionRegistry, Identity};
pub use room::{RoomKind, RoomName, GLOBAL_ROOM};
pub use router::{RoomRouter, RouterConfig, RouterError};
