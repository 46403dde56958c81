//! # surge-protocol
//!
//! Wire message definitions for the Surge event-distribution layer.
//!
//! Client ↔ server control traffic is JSON text over WebSocket. Delivered
//! domain events use the envelope defined in `surge-core` and are forwarded
//! as-is; this crate covers everything else:
//!
//! - `Subscribe` / `Unsubscribe` / `GetRooms` / `Ping` - client control messages
//! - `Connected` / `Subscribed` / `Rooms` / `Pong` / `Error` - server replies
//!
//! ## Example
//!
//! ```rust
//! use surge_protocol::{codec, ClientMessage};
//!
//! let msg = codec::decode_client(r#"{"type":"subscribe","room":"market","id":"7"}"#).unwrap();
//! assert!(matches!(msg, ClientMessage::Subscribe { .. }));
//! ```

pub mod codec;
pub mod messages;

pub use codec::{decode_client, encode_server, ProtocolError};
pub use messages::{ClientMessage, ServerMessage, SubscriptionReply};
