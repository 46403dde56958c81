//! # surge-backplane
//!
//! Cross-process publish/subscribe for the Surge event-distribution layer.
//!
//! Every server process publishes `(room, envelope)` pairs onto one shared
//! Redis pub/sub channel; every peer process replays what it receives into
//! its own local router. No other shared state exists: a backplane message
//! carries everything a receiver needs to re-run local delivery.
//!
//! If Redis is unreachable the process keeps running in degraded
//! single-instance mode: local delivery works, cross-process fan-out is
//! lost, and reconnection retries forever with capped exponential backoff.

pub mod backoff;
pub mod message;
pub mod null;
pub mod redis_backplane;

pub use backoff::ExponentialBackoff;
pub use message::{BackplaneMessage, InboundEvent};
pub use null::NullBackplane;
pub use redis_backplane::{BackplaneConfig, RedisBackplane};
