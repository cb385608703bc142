//! Zone detection and per-entity zone tracking.

use crate::event::{EventLog, EventType};
use crate::room::Entity;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[cfg(test)]
mod tests;

pub type ZoneId = String;

/// Rectangle in world pixels covering `[x, x+width) × [y, y+height)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ZoneBounds {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Shared edges do not count as overlap
    pub fn overlaps(&self, other: &ZoneBounds) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub bounds: ZoneBounds,
}

impl Zone {
    pub fn new(id: &str, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.to_string(),
            bounds: ZoneBounds { x, y, width, height },
        }
    }
}

/// Zone configuration errors (fatal at load time)
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneError {
    EmptyId,
    DuplicateId(ZoneId),
    EmptyBounds(ZoneId),
    Overlap { first: ZoneId, second: ZoneId },
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneError::EmptyId => write!(f, "zone id must not be empty"),
            ZoneError::DuplicateId(id) => write!(f, "zone '{}' is declared twice", id),
            ZoneError::EmptyBounds(id) => {
                write!(f, "zone '{}' must have positive width and height", id)
            }
            ZoneError::Overlap { first, second } => {
                write!(f, "zones '{}' and '{}' overlap", first, second)
            }
        }
    }
}

impl std::error::Error for ZoneError {}

/// Result of recomputing one entity's zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneUpdate {
    #[serde(rename = "currentZone")]
    pub current_zone: Option<ZoneId>,
    #[serde(rename = "previousZone")]
    pub previous_zone: Option<ZoneId>,
    pub changed: bool,
}

/// Maps positions to zones and remembers which zone each entity is in.
///
/// Zones never overlap (enforced by `new`), so a point is in at most one zone.
pub struct ZoneSystem {
    /// Declared order
    zones: Vec<Zone>,

    /// entity_id -> current zone (None = tracked, outside every zone)
    entity_zones: HashMap<String, Option<ZoneId>>,
}

impl ZoneSystem {
    pub fn new(zones: Vec<Zone>) -> Result<Self, ZoneError> {
        Self::validate(&zones)?;
        Ok(Self {
            zones,
            entity_zones: HashMap::new(),
        })
    }

    /// Reject empty ids, duplicate ids, degenerate rectangles and overlaps
    pub fn validate(zones: &[Zone]) -> Result<(), ZoneError> {
        for (i, zone) in zones.iter().enumerate() {
            if zone.id.is_empty() {
                return Err(ZoneError::EmptyId);
            }
            if !(zone.bounds.width > 0.0 && zone.bounds.height > 0.0) {
                return Err(ZoneError::EmptyBounds(zone.id.clone()));
            }
            for earlier in &zones[..i] {
                if earlier.id == zone.id {
                    return Err(ZoneError::DuplicateId(zone.id.clone()));
                }
                if earlier.bounds.overlaps(&zone.bounds) {
                    return Err(ZoneError::Overlap {
                        first: earlier.id.clone(),
                        second: zone.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn detect_zone(&self, x: f64, y: f64) -> Option<ZoneId> {
        self.zones
            .iter()
            .find(|zone| zone.bounds.contains(x, y))
            .map(|zone| zone.id.clone())
    }

    /// Recompute an entity's zone from its position.
    ///
    /// On change, updates tracking, writes the entity's `current_zone` if one
    /// is given, and appends `zone.exit` then `zone.enter` to the log if one
    /// is given.
    pub fn update_entity_zone(
        &mut self,
        entity_id: &str,
        x: f64,
        y: f64,
        event_log: Option<(&mut EventLog, &str)>,
        entity: Option<&mut Entity>,
    ) -> ZoneUpdate {
        let current = self.detect_zone(x, y);
        let previous = self.entity_zones.get(entity_id).cloned().flatten();
        let changed = current != previous;

        self.entity_zones
            .insert(entity_id.to_string(), current.clone());

        if changed {
            debug!(
                entity_id = %entity_id,
                from = ?previous,
                to = ?current,
                "Zone transition"
            );

            if let Some(entity) = entity {
                entity.current_zone = current.clone();
            }

            if let Some((log, room_id)) = event_log {
                if let Some(from) = &previous {
                    log.append(
                        EventType::ZoneExit,
                        room_id,
                        json!({ "entityId": entity_id, "zoneId": from, "nextZoneId": current }),
                    );
                }
                if let Some(to) = &current {
                    log.append(
                        EventType::ZoneEnter,
                        room_id,
                        json!({ "entityId": entity_id, "zoneId": to, "previousZoneId": previous }),
                    );
                }
            }
        }

        ZoneUpdate {
            current_zone: current,
            previous_zone: previous,
            changed,
        }
    }

    /// Stop tracking an entity, emitting `zone.exit` if it was inside a zone
    pub fn remove_entity(
        &mut self,
        entity_id: &str,
        event_log: Option<(&mut EventLog, &str)>,
    ) -> Option<ZoneId> {
        let previous = self.entity_zones.remove(entity_id).flatten();

        if let (Some(zone_id), Some((log, room_id))) = (&previous, event_log) {
            log.append(
                EventType::ZoneExit,
                room_id,
                json!({ "entityId": entity_id, "zoneId": zone_id, "nextZoneId": null }),
            );
        }

        previous
    }

    pub fn get_entity_zone(&self, entity_id: &str) -> Option<ZoneId> {
        self.entity_zones.get(entity_id).cloned().flatten()
    }

    /// Entity ids in a zone, sorted
    pub fn get_entities_in_zone(&self, zone_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entity_zones
            .iter()
            .filter(|(_, zone)| zone.as_deref() == Some(zone_id))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn get_zone_population(&self, zone_id: &str) -> usize {
        self.entity_zones
            .values()
            .filter(|zone| zone.as_deref() == Some(zone_id))
            .count()
    }

    /// Population of every zone, in declared order
    pub fn populations(&self) -> Vec<(ZoneId, usize)> {
        self.zones
            .iter()
            .map(|zone| (zone.id.clone(), self.get_zone_population(&zone.id)))
            .collect()
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zone(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.id == zone_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.entity_zones.len()
    }
}
