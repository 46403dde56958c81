//! Room naming for Surge.
//!
//! Rooms are named logical channels grouping connections interested in the
//! same entity's events. The canonical form is `{kind}:{id}`; both the local
//! router and the cross-process backplane use it as the join key, so two
//! requests naming the same (kind, id) must resolve to byte-identical names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum room name length.
pub const MAX_ROOM_NAME_LENGTH: usize = 256;

/// The room every connection is auto-subscribed to at handshake. System
/// maintenance and announcement events are routed here.
pub const GLOBAL_ROOM: &str = "global:all";

/// The kind of entity a room groups events for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    /// A prediction market.
    Market,
    /// A creator whose shares are traded.
    Creator,
    /// A single user's private event stream.
    User,
    /// The process-wide broadcast room.
    Global,
}

impl RoomKind {
    /// The canonical kind prefix used in room names.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Market => "market",
            RoomKind::Creator => "creator",
            RoomKind::User => "user",
            RoomKind::Global => "global",
        }
    }
}

impl FromStr for RoomKind {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "market" => Ok(RoomKind::Market),
            "creator" => Ok(RoomKind::Creator),
            "user" => Ok(RoomKind::User),
            "global" => Ok(RoomKind::Global),
            _ => Err("Unknown room kind"),
        }
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a room id (the part after the `kind:` prefix).
///
/// # Errors
///
/// Returns an error message if the id is invalid.
pub fn validate_room_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("Room id cannot be empty");
    }
    if id.len() > MAX_ROOM_NAME_LENGTH {
        return Err("Room id too long");
    }
    if !id.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Room id contains invalid characters");
    }
    if id.contains(':') {
        return Err("Room id cannot contain ':'");
    }
    Ok(())
}

/// A canonical room name in `{kind}:{id}` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    /// Build the canonical name for a (kind, id) pair.
    ///
    /// # Errors
    ///
    /// Returns an error message if the id is invalid.
    pub fn new(kind: RoomKind, id: &str) -> Result<Self, &'static str> {
        validate_room_id(id)?;
        // User ids are wallet addresses whose hex case varies between
        // callers; the canonical name is lowercase so one wallet maps to
        // exactly one room.
        if kind == RoomKind::User {
            return Ok(Self(format!(
                "{}:{}",
                kind.as_str(),
                id.to_ascii_lowercase()
            )));
        }
        Ok(Self(format!("{}:{}", kind.as_str(), id)))
    }

    /// The global broadcast room.
    #[must_use]
    pub fn global() -> Self {
        Self(GLOBAL_ROOM.to_string())
    }

    /// The private room for a user's wallet address.
    ///
    /// # Errors
    ///
    /// Returns an error message if the address is not a valid room id.
    pub fn user(wallet_address: &str) -> Result<Self, &'static str> {
        Self::new(RoomKind::User, wallet_address)
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The kind prefix of this room.
    #[must_use]
    pub fn kind(&self) -> Option<RoomKind> {
        let (prefix, _) = self.0.split_once(':')?;
        prefix.parse().ok()
    }

    /// The id portion of this room.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, id)| id)
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomName {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.split_once(':').ok_or("Room name missing ':'")?;
        let kind: RoomKind = kind.parse()?;
        RoomName::new(kind, id)
    }
}

impl From<RoomName> for String {
    fn from(room: RoomName) -> String {
        room.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_form() {
        let a = RoomName::new(RoomKind::Market, "7").unwrap();
        let b = RoomName::new(RoomKind::Market, "7").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "market:7");
    }

    #[test]
    fn test_global_room() {
        let room = RoomName::global();
        assert_eq!(room.as_str(), GLOBAL_ROOM);
        assert_eq!(room.kind(), Some(RoomKind::Global));
        assert_eq!(room.id(), Some("all"));
    }

    #[test]
    fn test_user_room_canonical_case() {
        // Wallet case variants all resolve to the same lowercase room.
        let room = RoomName::user("0xABC").unwrap();
        assert_eq!(room.as_str(), "user:0xabc");
        assert_eq!(room, RoomName::user("0xabc").unwrap());
        assert_eq!(room, "user:0xAbC".parse().unwrap());

        // Other kinds keep the id as given.
        let creator = RoomName::new(RoomKind::Creator, "Alice").unwrap();
        assert_eq!(creator.as_str(), "creator:Alice");
    }

    #[test]
    fn test_id_validation() {
        assert!(RoomName::new(RoomKind::Market, "").is_err());
        assert!(RoomName::new(RoomKind::Market, "a:b").is_err());
        assert!(RoomName::new(RoomKind::Market, "ok-id_1").is_ok());

        let long_id = "a".repeat(MAX_ROOM_NAME_LENGTH + 1);
        assert!(RoomName::new(RoomKind::Market, &long_id).is_err());
    }

    #[test]
    fn test_parse_roundtrip() {
        let room: RoomName = "creator:alice".parse().unwrap();
        assert_eq!(room.kind(), Some(RoomKind::Creator));
        assert_eq!(room.id(), Some("alice"));

        assert!("nocolon".parse::<RoomName>().is_err());
        assert!("bogus:kind".parse::<RoomName>().is_err());
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(RoomKind::Market.as_str(), "market");
        assert_eq!("user".parse::<RoomKind>().unwrap(), RoomKind::User);
        assert!("room".parse::<RoomKind>().is_err());
    }
}
