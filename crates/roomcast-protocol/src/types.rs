//! Chat value types and the rendered message format.
//!
//! These are the values that cross the HTTP boundary and travel to
//! clients. Each newtype validates its input on construction, so the
//! rest of the system can assume a `RoomName` is never empty and never
//! contains a path separator.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Maximum length of a room name or nickname, in characters.
pub const MAX_NAME_LEN: usize = 64;

/// Maximum length of a single message body, in characters.
pub const MAX_CONTENT_LEN: usize = 4096;

/// Sender name used for replies produced by the command bot.
pub const BOT_SENDER: &str = "BOT";

fn validate_name(
    field: &'static str,
    value: String,
) -> Result<String, ProtocolError> {
    if value.trim().is_empty() {
        return Err(ProtocolError::Empty { field });
    }
    let actual = value.chars().count();
    if actual > MAX_NAME_LEN {
        return Err(ProtocolError::TooLong {
            field,
            max: MAX_NAME_LEN,
            actual,
        });
    }
    if value.contains('/') {
        return Err(ProtocolError::InvalidChar { field, ch: '/' });
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The name of a chat room, as it appears in URLs.
///
/// Serialized as a bare string. Deserialization runs the same checks
/// as [`TryFrom`], so an invalid name can never be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomName(String);

impl RoomName {
    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomName {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name("room name", value).map(Self)
    }
}

impl TryFrom<&str> for RoomName {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_owned())
    }
}

impl From<RoomName> for String {
    fn from(name: RoomName) -> Self {
        name.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A participant's display name, unique within one room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Nickname(String);

impl Nickname {
    /// Returns the nickname as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Nickname {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name("nickname", value).map(Self)
    }
}

impl TryFrom<&str> for Nickname {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_owned())
    }
}

impl From<Nickname> for String {
    fn from(name: Nickname) -> Self {
        name.0
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The body of a chat message.
///
/// Surrounding whitespace is kept as sent; only blank bodies are
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent(String);

impl MessageContent {
    /// Returns the content as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this content is a bot command (starts with `prefix`).
    pub fn is_command(&self, prefix: char) -> bool {
        self.0.starts_with(prefix)
    }
}

impl TryFrom<String> for MessageContent {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(ProtocolError::Empty { field: "content" });
        }
        let actual = value.chars().count();
        if actual > MAX_CONTENT_LEN {
            return Err(ProtocolError::TooLong {
                field: "content",
                max: MAX_CONTENT_LEN,
                actual,
            });
        }
        Ok(Self(value))
    }
}

impl TryFrom<&str> for MessageContent {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_owned())
    }
}

// ---------------------------------------------------------------------------
// RenderedMessage
// ---------------------------------------------------------------------------

/// A chat line, ready to be written to clients and to history.
///
/// Once built it never changes. Its [`Display`](fmt::Display) form is
/// the exact text clients receive:
///
/// ```text
/// [2024-05-01T10:00:00Z] alice: hi
/// ```
///
/// The timestamp is always UTC with second precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    room: RoomName,
    sender: String,
    timestamp: DateTime<Utc>,
    content: String,
}

impl RenderedMessage {
    /// Builds a message with an explicit timestamp.
    pub fn new(
        room: RoomName,
        sender: impl Into<String>,
        timestamp: DateTime<Utc>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            room,
            sender: sender.into(),
            timestamp,
            content: content.into(),
        }
    }

    /// Builds a message stamped with the current time.
    pub fn now(
        room: RoomName,
        sender: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(room, sender, Utc::now(), content)
    }

    pub fn room(&self) -> &RoomName {
        &self.room
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the wire form, `"[<timestamp>] <sender>: <content>"`.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RenderedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.sender,
            self.content
        )
    }
}

// ---------------------------------------------------------------------------
// Room listing
// ---------------------------------------------------------------------------

/// One row of the room listing: a room and how many users are bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room: RoomName,
    pub users: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn room(name: &str) -> RoomName {
        RoomName::try_from(name).unwrap()
    }

    #[test]
    fn test_room_name_rejects_blank() {
        assert_eq!(
            RoomName::try_from("   "),
            Err(ProtocolError::Empty { field: "room name" })
        );
    }

    #[test]
    fn test_room_name_rejects_slash() {
        assert_eq!(
            RoomName::try_from("a/b"),
            Err(ProtocolError::InvalidChar {
                field: "room name",
                ch: '/'
            })
        );
    }

    #[test]
    fn test_nickname_length_counts_chars_not_bytes() {
        let ok = "é".repeat(MAX_NAME_LEN);
        assert!(Nickname::try_from(ok).is_ok());

        let too_long = "é".repeat(MAX_NAME_LEN + 1);
        assert_eq!(
            Nickname::try_from(too_long),
            Err(ProtocolError::TooLong {
                field: "nickname",
                max: MAX_NAME_LEN,
                actual: MAX_NAME_LEN + 1,
            })
        );
    }

    #[test]
    fn test_content_keeps_surrounding_whitespace() {
        let content = MessageContent::try_from("  hi  ").unwrap();
        assert_eq!(content.as_str(), "  hi  ");
    }

    #[test]
    fn test_content_rejects_oversized_body() {
        let body = "x".repeat(MAX_CONTENT_LEN + 1);
        assert!(matches!(
            MessageContent::try_from(body),
            Err(ProtocolError::TooLong { field: "content", .. })
        ));
    }

    #[test]
    fn test_content_command_detection() {
        assert!(MessageContent::try_from("/help").unwrap().is_command('/'));
        assert!(!MessageContent::try_from("help /me").unwrap().is_command('/'));
    }

    #[test]
    fn test_rendered_message_format() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let msg = RenderedMessage::new(room("r1"), "alice", ts, "hi");
        assert_eq!(msg.render(), "[2024-05-01T10:00:00Z] alice: hi");
    }

    #[test]
    fn test_rendered_message_drops_subsecond_precision() {
        let ts = Utc
            .with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
            .unwrap()
            + chrono::Duration::milliseconds(750);
        let msg = RenderedMessage::new(room("r1"), BOT_SENDER, ts, "pong");
        assert_eq!(msg.to_string(), "[2024-05-01T10:00:00Z] BOT: pong");
    }

    #[test]
    fn test_room_name_deserialize_validates() {
        let bad: Result<RoomName, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());

        let good: RoomName = serde_json::from_str("\"lobby\"").unwrap();
        assert_eq!(good.as_str(), "lobby");
    }

    #[test]
    fn test_room_summary_json_shape() {
        let summary = RoomSummary {
            room: room("lobby"),
            users: 3,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json, serde_json::json!({"room": "lobby", "users": 3}));
    }
}
