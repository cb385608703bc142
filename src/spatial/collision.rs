use crate::spatial::map::MapError;
use serde::{Deserialize, Serialize};

/// Integer tile address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub tx: i32,
    pub ty: i32,
}

impl TileCoord {
    pub fn new(tx: i32, ty: i32) -> Self {
        Self { tx, ty }
    }
}

/// Axis-aligned box in world (pixel) coordinates, covering `[x, x+width) × [y, y+height)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Aabb {
    /// Box of the given size centred on a point
    pub fn centered(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }
}

/// Static passability grid for one map. `blocked[ty][tx] == true` means blocked.
#[derive(Debug, Clone)]
pub struct CollisionGrid {
    width: u32,
    height: u32,
    tile_size: u32,
    blocked: Vec<Vec<bool>>,
}

impl CollisionGrid {
    /// Build from rows of tiles. Every row must have the same non-zero length.
    pub fn new(blocked: Vec<Vec<bool>>, tile_size: u32) -> Result<Self, MapError> {
        if tile_size == 0 {
            return Err(MapError::InvalidTileSize(0));
        }

        let height = blocked.len();
        let width = blocked.first().map_or(0, Vec::len);
        if width == 0 || height == 0 {
            return Err(MapError::InvalidDimensions {
                width: width as i64,
                height: height as i64,
            });
        }

        if let Some((row, cells)) = blocked.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(MapError::RaggedRow {
                row,
                expected: width,
                actual: cells.len(),
            });
        }

        Ok(Self {
            width: width as u32,
            height: height as u32,
            tile_size,
            blocked,
        })
    }

    /// Fully passable grid
    pub fn open(width: u32, height: u32, tile_size: u32) -> Result<Self, MapError> {
        Self::new(vec![vec![false; width as usize]; height as usize], tile_size)
    }

    /// Out-of-bounds tiles are always blocked
    pub fn is_blocked(&self, tx: i32, ty: i32) -> bool {
        if tx < 0 || ty < 0 || tx >= self.width as i32 || ty >= self.height as i32 {
            return true;
        }
        self.blocked[ty as usize][tx as usize]
    }

    pub fn world_to_tile(&self, x: f64, y: f64) -> TileCoord {
        let size = self.tile_size as f64;
        TileCoord {
            tx: (x / size).floor() as i32,
            ty: (y / size).floor() as i32,
        }
    }

    /// Centre of the tile in world coordinates
    pub fn tile_to_world(&self, tx: i32, ty: i32) -> (f64, f64) {
        let size = self.tile_size as f64;
        ((tx as f64 + 0.5) * size, (ty as f64 + 0.5) * size)
    }

    pub fn is_world_blocked(&self, x: f64, y: f64) -> bool {
        let tile = self.world_to_tile(x, y);
        self.is_blocked(tile.tx, tile.ty)
    }

    /// True if any tile the box overlaps is blocked
    pub fn check_aabb_collision(&self, bounds: &Aabb) -> bool {
        let size = self.tile_size as f64;
        // Tile indices stay in f64 until clamped to one tile past each edge;
        // everything out there is blocked, so the clamp never changes the answer.
        let clamp_x = |t: f64| t.clamp(-1.0, self.width as f64) as i32;
        let clamp_y = |t: f64| t.clamp(-1.0, self.height as f64) as i32;

        let start_tx = clamp_x((bounds.x / size).floor());
        let start_ty = clamp_y((bounds.y / size).floor());
        // The far edges are exclusive: a box ending exactly on a tile boundary
        // does not touch the next tile.
        let end_tx = clamp_x(((bounds.x + bounds.width) / size).ceil() - 1.0).max(start_tx);
        let end_ty = clamp_y(((bounds.y + bounds.height) / size).ceil() - 1.0).max(start_ty);

        (start_ty..=end_ty).any(|ty| (start_tx..=end_tx).any(|tx| self.is_blocked(tx, ty)))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Map extent in world pixels
    pub fn world_size(&self) -> (f64, f64) {
        (
            self.width as f64 * self.tile_size as f64,
            self.height as f64 * self.tile_size as f64,
        )
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.iter().flatten().filter(|&&b| b).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x3 grid, tile 16, wall at (1,1)
    fn small_grid() -> CollisionGrid {
        let mut rows = vec![vec![false; 4]; 3];
        rows[1][1] = true;
        CollisionGrid::new(rows, 16).unwrap()
    }

    #[test]
    fn test_is_blocked_in_bounds() {
        let grid = small_grid();
        assert!(grid.is_blocked(1, 1));
        assert!(!grid.is_blocked(0, 0));
        assert!(!grid.is_blocked(3, 2));
    }

    #[test]
    fn test_out_of_bounds_is_blocked() {
        let grid = small_grid();
        assert!(grid.is_blocked(-1, 0));
        assert!(grid.is_blocked(0, -1));
        assert!(grid.is_blocked(4, 0));
        assert!(grid.is_blocked(0, 3));
    }

    #[test]
    fn test_world_to_tile_floors() {
        let grid = small_grid();
        assert_eq!(grid.world_to_tile(0.0, 0.0), TileCoord::new(0, 0));
        assert_eq!(grid.world_to_tile(15.9, 16.0), TileCoord::new(0, 1));
        assert_eq!(grid.world_to_tile(-0.5, -16.0), TileCoord::new(-1, -1));
    }

    #[test]
    fn test_tile_to_world_is_center() {
        let grid = small_grid();
        assert_eq!(grid.tile_to_world(0, 0), (8.0, 8.0));
        assert_eq!(grid.tile_to_world(2, 1), (40.0, 24.0));
        assert_eq!(grid.world_to_tile(40.0, 24.0), TileCoord::new(2, 1));
    }

    #[test]
    fn test_aabb_touching_wall_collides() {
        let grid = small_grid();
        // Overlaps tiles (0,0)..(1,1)
        assert!(grid.check_aabb_collision(&Aabb { x: 10.0, y: 10.0, width: 10.0, height: 10.0 }));
        // Entirely inside tile (0,0)
        assert!(!grid.check_aabb_collision(&Aabb { x: 2.0, y: 2.0, width: 10.0, height: 10.0 }));
    }

    #[test]
    fn test_aabb_far_edge_is_exclusive() {
        let grid = small_grid();
        // Ends exactly at x=16, the wall tile starts there
        assert!(!grid.check_aabb_collision(&Aabb { x: 0.0, y: 16.0, width: 16.0, height: 16.0 }));
        assert!(grid.check_aabb_collision(&Aabb { x: 0.5, y: 16.0, width: 16.0, height: 16.0 }));
    }

    #[test]
    fn test_aabb_leaving_map_collides() {
        let grid = small_grid();
        assert!(grid.check_aabb_collision(&Aabb::centered(60.0, 8.0, 12.0, 12.0)));
        assert!(grid.check_aabb_collision(&Aabb::centered(2.0, 40.0, 12.0, 12.0)));
    }

    #[test]
    fn test_aabb_far_outside_map_collides() {
        let grid = CollisionGrid::open(4, 4, 16).unwrap();
        assert!(grid.check_aabb_collision(&Aabb::centered(-1.0e12, 8.0, 12.0, 12.0)));
        assert!(grid.check_aabb_collision(&Aabb::centered(8.0, -1.0e12, 12.0, 12.0)));
        assert!(grid.check_aabb_collision(&Aabb::centered(1.0e12, 1.0e12, 12.0, 12.0)));
        // Spans the whole map and far beyond
        assert!(grid.check_aabb_collision(&Aabb { x: -1.0e12, y: 0.0, width: 2.0e12, height: 8.0 }));
        assert!(!grid.check_aabb_collision(&Aabb::centered(8.0, 8.0, 12.0, 12.0)));
    }

    #[test]
    fn test_invalid_grids_rejected() {
        assert_eq!(
            CollisionGrid::new(vec![], 16).unwrap_err(),
            MapError::InvalidDimensions { width: 0, height: 0 }
        );
        assert_eq!(
            CollisionGrid::new(vec![vec![false; 2]], 0).unwrap_err(),
            MapError::InvalidTileSize(0)
        );
        assert_eq!(
            CollisionGrid::new(vec![vec![false; 2], vec![false; 3]], 16).unwrap_err(),
            MapError::RaggedRow { row: 1, expected: 2, actual: 3 }
        );
    }

    #[test]
    fn test_world_size() {
        let grid = CollisionGrid::open(64, 52, 16).unwrap();
        assert_eq!(grid.world_size(), (1024.0, 832.0));
        assert_eq!(grid.blocked_count(), 0);
    }

    #[test]
    fn test_world_size_with_huge_tiles() {
        let grid = CollisionGrid::open(32, 1, 134_217_728).unwrap();
        assert_eq!(grid.world_size(), (32.0 * 134_217_728.0, 134_217_728.0));
    }
}
