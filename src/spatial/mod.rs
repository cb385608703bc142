// Tile coordinates, collision grid and static map loading

pub mod collision;
pub mod map;

pub use collision::{Aabb, CollisionGrid, TileCoord};
pub use map::{MapData, MapError, SpawnPoint};
