//! Authoritative state for one room.
//!
//! `RoomState` owns the entities, the map, and one instance each of the
//! event log, zone system and proximity system. It assumes a single writer;
//! the registry serialises access with a per-room mutex.

pub mod entity;
pub mod metrics;
pub mod registry;


pub use entity::{ChatChannel, ChatMessage, Entity, EntityKind};
pub use metrics::{MetricsSnapshot, RoomMetrics};
pub use registry::{lock_room, RoomHandle, RoomRegistry, SharedRoom};

use crate::clock::SharedClock;
use crate::config::{AppConfig, ChatConfig};
use crate::event::{EventBatch, EventLog, EventType, RoomEvent};
use crate::proximity::{Position, ProximitySystem};
use crate::spatial::{Aabb, MapData, MapError, TileCoord};
use crate::zone::{ZoneId, ZoneSystem};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Collision box edge, world pixels
pub const ENTITY_SIZE: f64 = 12.0;

/// Bumped whenever `RoomSnapshot` changes shape
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Random spawn offsets tried before falling back to the exact spawn point
const SPAWN_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum RoomError {
    /// Entity is not in the room
    NotFound(String),
    InvalidInput(String),
    RoomNotFound(String),
    RoomAlreadyExists(String),
    InvalidMap(MapError),
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomError::NotFound(id) => write!(f, "entity '{}' not found", id),
            RoomError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            RoomError::RoomNotFound(id) => write!(f, "room '{}' not found", id),
            RoomError::RoomAlreadyExists(id) => write!(f, "room '{}' already exists", id),
            RoomError::InvalidMap(e) => write!(f, "invalid map: {}", e),
        }
    }
}

impl std::error::Error for RoomError {}

impl From<MapError> for RoomError {
    fn from(e: MapError) -> Self {
        RoomError::InvalidMap(e)
    }
}

/// Request to place a new entity
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEntity {
    /// Generated when absent
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub kind: EntityKind,
    /// Zone whose spawn point to use; the map's default spawn otherwise
    #[serde(rename = "spawnZone")]
    pub spawn_zone: Option<ZoneId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveStatus {
    Moved,
    /// Destination collides with the map; nothing changed
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveResult {
    pub status: MoveStatus,
    /// Position after the command
    pub x: f64,
    pub y: f64,
    pub tile: TileCoord,
    pub zone: Option<ZoneId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickSummary {
    pub tick: u64,
    #[serde(rename = "entityCount")]
    pub entity_count: usize,
    #[serde(rename = "proximityEvents")]
    pub proximity_events: usize,
    #[serde(rename = "nearPairs")]
    pub near_pairs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyEntity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub x: f64,
    pub y: f64,
    pub distance: f64,
    pub zone: Option<ZoneId>,
}

/// What one entity can perceive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    #[serde(rename = "self")]
    pub me: Entity,
    /// Closest first
    pub nearby: Vec<NearbyEntity>,
    pub zone: Option<ZoneId>,
    #[serde(rename = "zonePopulation")]
    pub zone_population: usize,
    pub cursor: String,
    pub tick: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonePopulation {
    #[serde(rename = "zoneId")]
    pub zone_id: ZoneId,
    pub population: usize,
}

/// Versioned full-state serialisation for state-delta transports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSnapshot {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "mapId")]
    pub map_id: String,
    pub tick: u64,
    pub cursor: String,
    /// Sorted by id
    pub entities: Vec<Entity>,
    pub zones: Vec<ZonePopulation>,
}

pub struct RoomState {
    room_id: String,
    map: MapData,
    entities: HashMap<String, Entity>,
    events: EventLog,
    zones: ZoneSystem,
    proximity: ProximitySystem,
    chat_history: VecDeque<ChatMessage>,
    chat_config: ChatConfig,
    tick: u64,
    metrics: RoomMetrics,
    clock: SharedClock,
}

impl RoomState {
    pub fn new(
        room_id: &str,
        map: MapData,
        config: &AppConfig,
        clock: SharedClock,
    ) -> Result<Self, RoomError> {
        if room_id.trim().is_empty() {
            return Err(RoomError::InvalidInput("room id must not be empty".to_string()));
        }

        let zones = ZoneSystem::new(map.zones.clone()).map_err(MapError::from)?;

        info!(
            room_id = %room_id,
            map_id = %map.map_id,
            zones = map.zones.len(),
            "Room created"
        );

        Ok(Self {
            room_id: room_id.to_string(),
            events: EventLog::new(
                config.event_log.retention_ms,
                config.event_log.max_size,
                clock.clone(),
            ),
            zones,
            proximity: ProximitySystem::new(
                config.proximity.radius,
                config.proximity.debounce_ms,
                clock.clone(),
            ),
            map,
            entities: HashMap::new(),
            chat_history: VecDeque::new(),
            chat_config: config.chat.clone(),
            tick: 0,
            metrics: RoomMetrics::new(),
            clock,
        })
    }

    /// Place a new entity at a spawn point and announce it
    pub fn add_entity(&mut self, new: NewEntity) -> Result<Entity, RoomError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(RoomError::InvalidInput("name must not be empty".to_string()));
        }

        let id = match new.id {
            Some(id) if id.trim().is_empty() => {
                return Err(RoomError::InvalidInput("entity id must not be empty".to_string()))
            }
            Some(id) => id,
            None => format!("{}_{}", new.kind.as_str(), Uuid::new_v4().simple()),
        };
        if self.entities.contains_key(&id) {
            return Err(RoomError::InvalidInput(format!(
                "entity '{}' is already in the room",
                id
            )));
        }

        let base = match &new.spawn_zone {
            Some(zone_id) => {
                let spawn = self.map.spawn_for_zone(zone_id).ok_or_else(|| {
                    RoomError::InvalidInput(format!("no spawn point for zone '{}'", zone_id))
                })?;
                (spawn.x, spawn.y)
            }
            None => self.map.default_spawn(),
        };
        let (x, y) = self.spawn_position(base);

        let mut entity = Entity::new(&id, name, new.kind, x, y);
        entity.last_active_ms = self.clock.now_ms();

        self.events.append(
            EventType::PresenceJoin,
            &self.room_id,
            json!({
                "entityId": id,
                "name": entity.name,
                "kind": entity.kind.as_str(),
                "x": x,
                "y": y,
            }),
        );
        self.zones.update_entity_zone(
            &id,
            x,
            y,
            Some((&mut self.events, &self.room_id)),
            Some(&mut entity),
        );

        info!(
            room_id = %self.room_id,
            entity_id = %id,
            kind = entity.kind.as_str(),
            zone = ?entity.current_zone,
            "Entity joined room"
        );

        self.entities.insert(id, entity.clone());
        self.metrics.record_command();
        self.sync_event_metrics();
        Ok(entity)
    }

    /// Remove an entity, emitting `zone.exit` (if in a zone) then `presence.leave`
    pub fn remove_entity(&mut self, entity_id: &str) -> Result<Entity, RoomError> {
        let entity = self
            .entities
            .remove(entity_id)
            .ok_or_else(|| RoomError::NotFound(entity_id.to_string()))?;

        self.zones
            .remove_entity(entity_id, Some((&mut self.events, &self.room_id)));
        self.proximity.remove_entity(entity_id);
        self.events.append(
            EventType::PresenceLeave,
            &self.room_id,
            json!({ "entityId": entity_id, "name": entity.name }),
        );

        info!(room_id = %self.room_id, entity_id = %entity_id, "Entity left room");

        self.metrics.record_command();
        self.sync_event_metrics();
        Ok(entity)
    }

    /// Move an entity to a world position.
    ///
    /// A destination whose collision box touches a blocked tile is reported as
    /// `Blocked` and leaves the entity where it was. Zone changes are applied
    /// immediately; proximity catches up on the next tick.
    pub fn move_entity(&mut self, entity_id: &str, x: f64, y: f64) -> Result<MoveResult, RoomError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(RoomError::InvalidInput(
                "coordinates must be finite".to_string(),
            ));
        }

        let now = self.clock.now_ms();
        let grid = &self.map.grid;
        let entity = self
            .entities
            .get_mut(entity_id)
            .ok_or_else(|| RoomError::NotFound(entity_id.to_string()))?;

        self.metrics.record_command();

        if grid.check_aabb_collision(&Aabb::centered(x, y, ENTITY_SIZE, ENTITY_SIZE)) {
            debug!(entity_id = %entity_id, x = x, y = y, "Move blocked");
            return Ok(MoveResult {
                status: MoveStatus::Blocked,
                x: entity.x,
                y: entity.y,
                tile: grid.world_to_tile(entity.x, entity.y),
                zone: entity.current_zone.clone(),
            });
        }

        entity.x = x;
        entity.y = y;
        entity.last_active_ms = now;

        let update = self.zones.update_entity_zone(
            entity_id,
            x,
            y,
            Some((&mut self.events, &self.room_id)),
            Some(entity),
        );

        self.sync_event_metrics();
        Ok(MoveResult {
            status: MoveStatus::Moved,
            x,
            y,
            tile: grid.world_to_tile(x, y),
            zone: update.current_zone,
        })
    }

    /// Move an entity to the centre of a tile
    pub fn move_to_tile(&mut self, entity_id: &str, tile: TileCoord) -> Result<MoveResult, RoomError> {
        let (x, y) = self.map.grid.tile_to_world(tile.tx, tile.ty);
        self.move_entity(entity_id, x, y)
    }

    pub fn send_chat(
        &mut self,
        entity_id: &str,
        channel: ChatChannel,
        message: &str,
    ) -> Result<ChatMessage, RoomError> {
        let text = message.trim();
        if text.is_empty() {
            return Err(RoomError::InvalidInput("message must not be empty".to_string()));
        }
        let length = text.chars().count();
        if length > self.chat_config.max_message_length {
            return Err(RoomError::InvalidInput(format!(
                "message is {} characters, limit is {}",
                length, self.chat_config.max_message_length
            )));
        }

        let now = self.clock.now_ms();
        let sender = self
            .entities
            .get_mut(entity_id)
            .ok_or_else(|| RoomError::NotFound(entity_id.to_string()))?;
        sender.last_active_ms = now;
        let sender_name = sender.name.clone();

        let recipients = match channel {
            ChatChannel::Proximity => self.proximity.near(entity_id),
            ChatChannel::Global => {
                let mut ids: Vec<String> = self
                    .entities
                    .keys()
                    .filter(|id| id.as_str() != entity_id)
                    .cloned()
                    .collect();
                ids.sort();
                ids
            }
        };

        let chat = ChatMessage {
            id: Uuid::now_v7().to_string(),
            sender_id: entity_id.to_string(),
            sender_name,
            channel,
            message: text.to_string(),
            timestamp_ms: now,
            recipients,
        };

        self.events.append(
            EventType::ChatMessage,
            &self.room_id,
            json!({
                "messageId": chat.id,
                "senderId": chat.sender_id,
                "senderName": chat.sender_name,
                "channel": channel.as_str(),
                "message": chat.message,
                "recipients": chat.recipients,
            }),
        );

        self.chat_history.push_back(chat.clone());
        while self.chat_history.len() > self.chat_config.history_size {
            self.chat_history.pop_front();
        }

        debug!(
            room_id = %self.room_id,
            entity_id = %entity_id,
            channel = channel.as_str(),
            recipients = chat.recipients.len(),
            "Chat message sent"
        );

        self.metrics.record_command();
        self.sync_event_metrics();
        Ok(chat)
    }

    /// Advance the simulation by one tick: recompute proximity over every
    /// entity and record the transitions.
    pub fn tick(&mut self) -> TickSummary {
        let started = Instant::now();
        self.tick += 1;

        let positions: HashMap<String, Position> = self
            .entities
            .values()
            .map(|e| (e.id.clone(), e.position()))
            .collect();

        let transitions = self.proximity.update(&positions);
        for transition in &transitions {
            self.events.append(
                transition.kind.event_type(),
                &self.room_id,
                json!({
                    "subjectId": transition.subject_id,
                    "otherId": transition.other_id,
                    "distance": transition.distance,
                }),
            );
        }

        if !transitions.is_empty() {
            debug!(
                room_id = %self.room_id,
                tick = self.tick,
                events = transitions.len(),
                "Proximity transitions"
            );
        }

        self.metrics
            .record_tick(started.elapsed().as_micros().min(u64::MAX as u128) as u64);
        self.sync_event_metrics();

        TickSummary {
            tick: self.tick,
            entity_count: self.entities.len(),
            proximity_events: transitions.len(),
            near_pairs: self.proximity.pair_count(),
        }
    }

    /// Everything `entity_id` can see within `radius` world pixels
    pub fn observe(&self, entity_id: &str, radius: f64) -> Result<Observation, RoomError> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(RoomError::InvalidInput(
                "radius must be a non-negative number".to_string(),
            ));
        }

        let me = self
            .entities
            .get(entity_id)
            .ok_or_else(|| RoomError::NotFound(entity_id.to_string()))?;
        let origin = me.position();

        let mut nearby: Vec<NearbyEntity> = self
            .entities
            .values()
            .filter(|other| other.id != me.id)
            .map(|other| (other, origin.distance_to(&other.position())))
            .filter(|(_, distance)| *distance <= radius)
            .map(|(other, distance)| NearbyEntity {
                id: other.id.clone(),
                name: other.name.clone(),
                kind: other.kind,
                x: other.x,
                y: other.y,
                distance,
                zone: other.current_zone.clone(),
            })
            .collect();
        nearby.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));

        let zone = self.zones.get_entity_zone(entity_id);
        let zone_population = zone
            .as_deref()
            .map_or(0, |zone_id| self.zones.get_zone_population(zone_id));

        Ok(Observation {
            me: me.clone(),
            nearby,
            zone,
            zone_population,
            cursor: self.events.get_current_cursor(),
            tick: self.tick,
        })
    }

    pub fn poll_events(&self, cursor: &str, limit: usize) -> EventBatch {
        let batch = self.events.get_since(cursor, limit);
        if batch.cursor_expired {
            warn!(
                room_id = %self.room_id,
                cursor = %cursor,
                next_cursor = %batch.next_cursor,
                "Cursor expired, client must resync"
            );
        }
        batch
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let mut entities: Vec<Entity> = self.entities.values().cloned().collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));

        RoomSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            room_id: self.room_id.clone(),
            map_id: self.map.map_id.clone(),
            tick: self.tick,
            cursor: self.events.get_current_cursor(),
            entities,
            zones: self
                .zones
                .populations()
                .into_iter()
                .map(|(zone_id, population)| ZonePopulation {
                    zone_id,
                    population,
                })
                .collect(),
        }
    }

    /// Retention pass over the event log. Returns how many events were dropped.
    pub fn cleanup_events(&mut self) -> usize {
        self.events.cleanup()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn map(&self) -> &MapData {
        &self.map
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn entity(&self, entity_id: &str) -> Option<&Entity> {
        self.entities.get(entity_id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Oldest first
    pub fn chat_history(&self) -> impl Iterator<Item = &ChatMessage> {
        self.chat_history.iter()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    pub fn zones(&self) -> &ZoneSystem {
        &self.zones
    }

    pub fn proximity(&self) -> &ProximitySystem {
        &self.proximity
    }

    pub fn metrics(&self) -> &RoomMetrics {
        &self.metrics
    }

    fn spawn_position(&self, base: (f64, f64)) -> (f64, f64) {
        let jitter = self.map.grid.tile_size() as f64;
        let mut rng = rand::thread_rng();

        for _ in 0..SPAWN_ATTEMPTS {
            let x = base.0 + rng.gen_range(-jitter..=jitter);
            let y = base.1 + rng.gen_range(-jitter..=jitter);
            if self.is_passable(x, y) {
                return (x, y);
            }
        }

        if !self.is_passable(base.0, base.1) {
            warn!(
                room_id = %self.room_id,
                x = base.0,
                y = base.1,
                "Spawn point is blocked, placing entity anyway"
            );
        }
        base
    }

    fn is_passable(&self, x: f64, y: f64) -> bool {
        !self
            .map
            .grid
            .check_aabb_collision(&Aabb::centered(x, y, ENTITY_SIZE, ENTITY_SIZE))
    }

    fn sync_event_metrics(&self) {
        self.metrics.set_events_appended(self.events.total_appended());
    }
}
