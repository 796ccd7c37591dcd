//! Tile coordinates.

use crate::dimension::DimensionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tiles per region edge (a region is an 8x8 block of tiles).
pub const REGION_SIZE: i32 = 8;

/// Chunk shift: a tile covers 4x4 game chunks.
const CHUNK_SHIFT: u32 = 2;
/// Block shift: a tile covers 64x64 blocks.
const BLOCK_SHIFT: u32 = 6;
const REGION_SHIFT: u32 = 3;

/// Coordinate of one replicated tile.
///
/// Region and local coordinates are derived on demand and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    /// Dimension the tile belongs to.
    pub dimension: DimensionId,
    /// Tile X.
    pub x: i32,
    /// Tile Z.
    pub z: i32,
}

impl TileCoord {
    /// Creates a tile coordinate.
    pub fn new(dimension: DimensionId, x: i32, z: i32) -> Self {
        Self { dimension, x, z }
    }

    /// Returns the tile containing the given game chunk.
    pub fn from_chunk(dimension: DimensionId, chunk_x: i32, chunk_z: i32) -> Self {
        Self::new(dimension, chunk_x >> CHUNK_SHIFT, chunk_z >> CHUNK_SHIFT)
    }

    /// Returns the tile containing the given block position.
    pub fn from_block(dimension: DimensionId, block_x: i32, block_z: i32) -> Self {
        Self::new(dimension, block_x >> BLOCK_SHIFT, block_z >> BLOCK_SHIFT)
    }

    /// Region X (8x8 tiles per region).
    pub fn region_x(&self) -> i32 {
        self.x >> REGION_SHIFT
    }

    /// Region Z.
    pub fn region_z(&self) -> i32 {
        self.z >> REGION_SHIFT
    }

    /// X within the region, `0..8`.
    pub fn local_x(&self) -> i32 {
        self.x & (REGION_SIZE - 1)
    }

    /// Z within the region, `0..8`.
    pub fn local_z(&self) -> i32 {
        self.z & (REGION_SIZE - 1)
    }

    /// File name of this tile inside its dimension folder: `{x}_{z}.bin`.
    pub fn file_name(&self) -> String {
        format!("{}_{}.bin", self.x, self.z)
    }

    /// Parses a `{x}_{z}.bin` file name back into a coordinate.
    pub fn from_file_name(dimension: DimensionId, file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".bin")?;
        let (x, z) = stem.split_once('_')?;
        let x = x.parse().ok()?;
        let z = z.parse().ok()?;
        Some(Self::new(dimension, x, z))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TileCoord[{}, {}, {}]", self.dimension, self.x, self.z)
    }
}
