use std::fmt;

use serde::Serialize;

/// Top-left pixel offset of a tile in the padded output coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileCoordinate {
    /// Horizontal offset in pixels (column)
    pub x: u32,

    /// Vertical offset in pixels (row)
    pub y: u32,
}

impl TileCoordinate {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Cell index of this tile in the coarse per-tile grid, as `(row, col)`.
    pub fn cell(&self, tile_size: u32) -> (usize, usize) {
        ((self.y / tile_size) as usize, (self.x / tile_size) as usize)
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(u32, u32)> for TileCoordinate {
    fn from((x, y): (u32, u32)) -> Self {
        Self { x, y }
    }
}
