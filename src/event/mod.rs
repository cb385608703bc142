use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub mod cursor;
mod log;

pub use cursor::{decode_cursor, encode_cursor, CursorError, CursorParts};
pub use log::{EventBatch, EventLog};

/// RoomEvent is an immutable record of something that happened in a room.
///
/// Events are addressed by their cursor, which sorts in append order and
/// decodes back to `(relative_ms, sequence)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    /// Sortable, decodable position in the room's event log
    pub cursor: String,

    #[serde(rename = "type")]
    pub event_type: EventType,

    #[serde(rename = "roomId")]
    pub room_id: String,

    /// Unix epoch milliseconds at append time
    #[serde(rename = "timestampMs")]
    pub timestamp_ms: i64,

    /// Event-specific data, always a JSON object
    pub payload: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "presence.join")]
    PresenceJoin,
    #[serde(rename = "presence.leave")]
    PresenceLeave,
    #[serde(rename = "zone.enter")]
    ZoneEnter,
    #[serde(rename = "zone.exit")]
    ZoneExit,
    #[serde(rename = "proximity.enter")]
    ProximityEnter,
    #[serde(rename = "proximity.exit")]
    ProximityExit,
    #[serde(rename = "chat.message")]
    ChatMessage,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PresenceJoin => "presence.join",
            EventType::PresenceLeave => "presence.leave",
            EventType::ZoneEnter => "zone.enter",
            EventType::ZoneExit => "zone.exit",
            EventType::ProximityEnter => "proximity.enter",
            EventType::ProximityExit => "proximity.exit",
            EventType::ChatMessage => "chat.message",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
