use crate::proximity::Position;
use crate::zone::ZoneId;
use serde::{Deserialize, Serialize};

/// Who controls an entity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Human,
    #[default]
    Agent,
    Npc,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Human => "human",
            EntityKind::Agent => "agent",
            EntityKind::Npc => "npc",
        }
    }
}

/// Something with a position in a room
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,

    /// World pixels, centre of the entity
    pub x: f64,
    pub y: f64,

    /// Written by the zone system on transitions
    #[serde(rename = "currentZone")]
    pub current_zone: Option<ZoneId>,

    #[serde(rename = "lastActiveMs")]
    pub last_active_ms: i64,
}

impl Entity {
    pub fn new(id: &str, name: &str, kind: EntityKind, x: f64, y: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            x,
            y,
            current_zone: None,
            last_active_ms: 0,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatChannel {
    #[default]
    Global,
    /// Only entities currently near the sender
    Proximity,
}

impl ChatChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatChannel::Global => "global",
            ChatChannel::Proximity => "proximity",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// UUIDv7, so ids sort by send time
    pub id: String,
    #[serde(rename = "senderId")]
    pub sender_id: String,
    #[serde(rename = "senderName")]
    pub sender_name: String,
    pub channel: ChatChannel,
    pub message: String,
    #[serde(rename = "timestampMs")]
    pub timestamp_ms: i64,
    /// Entity ids the message was delivered to, sorted
    pub recipients: Vec<String>,
}
