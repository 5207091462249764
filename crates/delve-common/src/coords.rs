//! Coordinate types for world, chunk, and local positions.
//!
//! The world is addressed in tiles ([`WorldPos`]). Tiles are grouped into
//! square chunks of [`CHUNK_SIZE`] tiles, addressed by [`ChunkUv`]. Inside a
//! chunk a tile is addressed by [`LocalPos`].

use serde::{Deserialize, Serialize};

/// Width and height of a chunk in tiles.
pub const CHUNK_SIZE: i32 = 16;

/// Number of tiles in one chunk.
pub const CHUNK_AREA: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize;

/// World coordinate in tiles (global position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldPos {
    /// X coordinate in world space
    pub x: i32,
    /// Y coordinate in world space
    pub y: i32,
}

impl WorldPos {
    /// Creates a new world position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the chunk containing this position.
    #[must_use]
    pub const fn to_chunk_uv(self) -> ChunkUv {
        ChunkUv {
            u: self.x.div_euclid(CHUNK_SIZE),
            v: self.y.div_euclid(CHUNK_SIZE),
        }
    }

    /// Returns this position's offset inside its chunk.
    #[must_use]
    pub const fn to_local(self) -> LocalPos {
        LocalPos {
            x: self.x.rem_euclid(CHUNK_SIZE) as u8,
            y: self.y.rem_euclid(CHUNK_SIZE) as u8,
        }
    }

    /// Packs the position into a single integer key.
    ///
    /// X occupies the high 32 bits and Y the low 32 bits, both as two's
    /// complement.
    #[must_use]
    pub const fn pack(self) -> u64 {
        ((self.x as u32 as u64) << 32) | (self.y as u32 as u64)
    }

    /// Inverse of [`WorldPos::pack`].
    #[must_use]
    pub const fn unpack(key: u64) -> Self {
        Self {
            x: (key >> 32) as u32 as i32,
            y: key as u32 as i32,
        }
    }

    /// Returns the position shifted by `(dx, dy)`.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
        }
    }

    /// Chebyshev (L∞) distance to another position.
    #[must_use]
    pub const fn chebyshev(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        if dx > dy {
            dx
        } else {
            dy
        }
    }
}

impl std::fmt::Display for WorldPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Chunk coordinate (identifies a chunk in the chunk grid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkUv {
    /// Column in chunk space
    pub u: i32,
    /// Row in chunk space
    pub v: i32,
}

impl ChunkUv {
    /// Creates a new chunk coordinate.
    #[must_use]
    pub const fn new(u: i32, v: i32) -> Self {
        Self { u, v }
    }

    /// World position of the chunk's top-left tile.
    #[must_use]
    pub const fn origin(self) -> WorldPos {
        WorldPos {
            x: self.u * CHUNK_SIZE,
            y: self.v * CHUNK_SIZE,
        }
    }

    /// Converts a local offset in this chunk to a world position.
    #[must_use]
    pub const fn local_to_world(self, local: LocalPos) -> WorldPos {
        WorldPos {
            x: self.u * CHUNK_SIZE + local.x as i32,
            y: self.v * CHUNK_SIZE + local.y as i32,
        }
    }

    /// Chebyshev (L∞) distance in chunks.
    #[must_use]
    pub const fn chebyshev(self, other: Self) -> u32 {
        let du = self.u.abs_diff(other.u);
        let dv = self.v.abs_diff(other.v);
        if du > dv {
            du
        } else {
            dv
        }
    }
}

impl std::fmt::Display for ChunkUv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}, {}>", self.u, self.v)
    }
}

/// Local coordinate within a chunk (0 to CHUNK_SIZE-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalPos {
    /// X coordinate within chunk
    pub x: u8,
    /// Y coordinate within chunk
    pub y: u8,
}

impl LocalPos {
    /// Creates a new local coordinate.
    #[must_use]
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Converts to a row-major index for a grid of side `size`.
    #[must_use]
    pub const fn to_index(self, size: usize) -> usize {
        (self.y as usize) * size + (self.x as usize)
    }

    /// Creates from a row-major index for a grid of side `size`.
    #[must_use]
    pub const fn from_index(index: usize, size: usize) -> Self {
        Self {
            x: (index % size) as u8,
            y: (index / size) as u8,
        }
    }

    /// Iterates every local position of a chunk in row-major order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..CHUNK_AREA).map(|i| Self::from_index(i, CHUNK_SIZE as usize))
    }
}
