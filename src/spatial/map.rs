//! Static map data loaded once per room.
//!
//! Input is the Tiled JSON the asset pipeline exports: a `collision` tile
//! layer (non-zero gid = blocked) and an object group carrying `zone` and
//! `spawn` rectangles tagged with a `zoneId` property.

use crate::spatial::collision::CollisionGrid;
use crate::zone::{Zone, ZoneError, ZoneId, ZoneSystem};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;

const COLLISION_LAYER: &str = "collision";

/// Map load errors. All are fatal: a room cannot start without a valid map.
#[derive(Debug, Clone, PartialEq)]
pub enum MapError {
    Io(String),
    Parse(String),
    InvalidDimensions { width: i64, height: i64 },
    InvalidTileSize(i64),
    NonSquareTiles { width: i64, height: i64 },
    MissingLayer(String),
    DataLength { expected: usize, actual: usize },
    RaggedRow { row: usize, expected: usize, actual: usize },
    ZoneMissingId(u64),
    InvalidZones(ZoneError),
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::Io(msg) => write!(f, "failed to read map: {}", msg),
            MapError::Parse(msg) => write!(f, "failed to parse map JSON: {}", msg),
            MapError::InvalidDimensions { width, height } => {
                write!(f, "map dimensions must be positive, got {}x{}", width, height)
            }
            MapError::InvalidTileSize(size) => {
                write!(f, "tile size must be positive, got {}", size)
            }
            MapError::NonSquareTiles { width, height } => {
                write!(f, "tiles must be square, got {}x{}", width, height)
            }
            MapError::MissingLayer(name) => write!(f, "map has no '{}' tile layer", name),
            MapError::DataLength { expected, actual } => write!(
                f,
                "collision layer has {} tiles, expected {}",
                actual, expected
            ),
            MapError::RaggedRow {
                row,
                expected,
                actual,
            } => write!(
                f,
                "collision row {} has {} tiles, expected {}",
                row, actual, expected
            ),
            MapError::ZoneMissingId(object_id) => {
                write!(f, "zone object {} has no zoneId property", object_id)
            }
            MapError::InvalidZones(e) => write!(f, "invalid zones: {}", e),
        }
    }
}

impl std::error::Error for MapError {}

impl From<ZoneError> for MapError {
    fn from(e: ZoneError) -> Self {
        MapError::InvalidZones(e)
    }
}

/// Where entities appear when they join, in world pixels
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPoint {
    pub zone_id: ZoneId,
    pub x: f64,
    pub y: f64,
}

/// Everything a room needs from its map
#[derive(Debug, Clone)]
pub struct MapData {
    pub map_id: String,
    pub grid: CollisionGrid,
    /// Declared order
    pub zones: Vec<Zone>,
    pub spawns: Vec<SpawnPoint>,
}

#[derive(Deserialize)]
struct TiledMap {
    width: i64,
    height: i64,
    tilewidth: i64,
    tileheight: i64,
    #[serde(default)]
    layers: Vec<TiledLayer>,
    #[serde(default)]
    properties: Vec<TiledProperty>,
}

#[derive(Deserialize)]
struct TiledLayer {
    name: String,
    #[serde(rename = "type")]
    layer_type: String,
    #[serde(default)]
    data: Vec<u32>,
    #[serde(default)]
    objects: Vec<TiledObject>,
}

#[derive(Deserialize)]
struct TiledObject {
    #[serde(default)]
    id: u64,
    // Tiled 1.9+ writes "class" where older versions wrote "type"
    #[serde(rename = "type", alias = "class", default)]
    object_type: String,
    x: f64,
    y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
    #[serde(default)]
    properties: Vec<TiledProperty>,
}

#[derive(Deserialize)]
struct TiledProperty {
    name: String,
    value: Value,
}

fn string_property(properties: &[TiledProperty], name: &str) -> Option<String> {
    properties
        .iter()
        .find(|p| p.name == name)
        .and_then(|p| p.value.as_str())
        .map(str::to_string)
}

impl MapData {
    pub fn load(path: &Path) -> Result<Self, MapError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MapError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_tiled_json(&contents)
    }

    pub fn from_tiled_json(json: &str) -> Result<Self, MapError> {
        let tiled: TiledMap =
            serde_json::from_str(json).map_err(|e| MapError::Parse(e.to_string()))?;

        if tiled.width <= 0 || tiled.height <= 0 {
            return Err(MapError::InvalidDimensions {
                width: tiled.width,
                height: tiled.height,
            });
        }
        if tiled.tilewidth <= 0 || tiled.tilewidth > u32::MAX as i64 {
            return Err(MapError::InvalidTileSize(tiled.tilewidth));
        }
        if tiled.tilewidth != tiled.tileheight {
            return Err(MapError::NonSquareTiles {
                width: tiled.tilewidth,
                height: tiled.tileheight,
            });
        }

        let width = tiled.width as usize;
        let height = tiled.height as usize;
        let tile_count = width
            .checked_mul(height)
            .ok_or(MapError::InvalidDimensions {
                width: tiled.width,
                height: tiled.height,
            })?;

        let collision = tiled
            .layers
            .iter()
            .find(|l| l.layer_type == "tilelayer" && l.name == COLLISION_LAYER)
            .ok_or_else(|| MapError::MissingLayer(COLLISION_LAYER.to_string()))?;

        if collision.data.len() != tile_count {
            return Err(MapError::DataLength {
                expected: tile_count,
                actual: collision.data.len(),
            });
        }

        let rows: Vec<Vec<bool>> = collision
            .data
            .chunks(width)
            .map(|row| row.iter().map(|&gid| gid != 0).collect())
            .collect();
        let grid = CollisionGrid::new(rows, tiled.tilewidth as u32)?;

        let mut zones = Vec::new();
        let mut spawns = Vec::new();
        let objects = tiled
            .layers
            .iter()
            .filter(|l| l.layer_type == "objectgroup")
            .flat_map(|l| l.objects.iter());

        for object in objects {
            match object.object_type.as_str() {
                "zone" => {
                    let zone_id = string_property(&object.properties, "zoneId")
                        .ok_or(MapError::ZoneMissingId(object.id))?;
                    zones.push(Zone::new(
                        &zone_id,
                        object.x,
                        object.y,
                        object.width,
                        object.height,
                    ));
                }
                "spawn" => {
                    if let Some(zone_id) = string_property(&object.properties, "zoneId") {
                        spawns.push(SpawnPoint {
                            zone_id,
                            x: object.x + object.width / 2.0,
                            y: object.y + object.height / 2.0,
                        });
                    }
                }
                _ => {}
            }
        }

        ZoneSystem::validate(&zones)?;

        let map_id =
            string_property(&tiled.properties, "mapId").unwrap_or_else(|| "map".to_string());

        Ok(Self {
            map_id,
            grid,
            zones,
            spawns,
        })
    }

    /// Map assembled in code, mostly for tests
    pub fn from_parts(
        map_id: &str,
        grid: CollisionGrid,
        zones: Vec<Zone>,
        spawns: Vec<SpawnPoint>,
    ) -> Result<Self, MapError> {
        ZoneSystem::validate(&zones)?;
        Ok(Self {
            map_id: map_id.to_string(),
            grid,
            zones,
            spawns,
        })
    }

    pub fn spawn_for_zone(&self, zone_id: &str) -> Option<&SpawnPoint> {
        self.spawns.iter().find(|s| s.zone_id == zone_id)
    }

    /// First declared spawn point, or the map centre when there are none
    pub fn default_spawn(&self) -> (f64, f64) {
        match self.spawns.first() {
            Some(spawn) => (spawn.x, spawn.y),
            None => {
                let (w, h) = self.grid.world_size();
                (w / 2.0, h / 2.0)
            }
        }
    }
}
