//! Pooled chunk buffers.

use delve_common::{ChunkUv, LocalPos, CHUNK_SIZE};

use crate::grid::{BitGrid, IdGrid, TileGrid};
use crate::tile::Tile;

/// Side length of a chunk's grids.
pub const CHUNK_GRID_SIZE: usize = CHUNK_SIZE as usize;

/// One 16×16 slice of the world held in the chunk pool.
///
/// Buffers are allocated once and reused. A chunk is *bound* while it holds
/// the contents of a resident UV and *free* otherwise.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Resident UV, if bound
    uv: Option<ChunkUv>,
    /// Terrain
    tiles: TileGrid,
    /// Cells the player can see
    visibility: BitGrid,
    /// Cells that block movement
    collision: BitGrid,
    /// Occupant stacks
    ids: IdGrid,
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk {
    /// Creates a free chunk with zeroed buffers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            uv: None,
            tiles: TileGrid::new(CHUNK_GRID_SIZE),
            visibility: BitGrid::new(CHUNK_GRID_SIZE),
            collision: BitGrid::new(CHUNK_GRID_SIZE),
            ids: IdGrid::new(CHUNK_GRID_SIZE),
        }
    }

    /// Resident UV, `None` while free.
    #[must_use]
    pub const fn uv(&self) -> Option<ChunkUv> {
        self.uv
    }

    /// Whether the chunk currently holds a resident UV.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.uv.is_some()
    }

    /// Binds the chunk to `uv` and clears the flag and occupant grids.
    ///
    /// Tiles are left as they were; the loader overwrites every cell.
    pub fn bind(&mut self, uv: ChunkUv) {
        self.uv = Some(uv);
        self.visibility.clear_all();
        self.collision.clear_all();
        self.ids.clear();
    }

    /// Unbinds the chunk and wipes every buffer.
    pub fn release(&mut self) {
        self.uv = None;
        self.tiles.fill(Tile::Void);
        self.visibility.clear_all();
        self.collision.clear_all();
        self.ids.clear();
    }

    /// Terrain grid.
    #[must_use]
    pub const fn tiles(&self) -> &TileGrid {
        &self.tiles
    }

    /// Mutable terrain grid.
    pub fn tiles_mut(&mut self) -> &mut TileGrid {
        &mut self.tiles
    }

    /// Visibility flags.
    #[must_use]
    pub const fn visibility(&self) -> &BitGrid {
        &self.visibility
    }

    /// Mutable visibility flags.
    pub fn visibility_mut(&mut self) -> &mut BitGrid {
        &mut self.visibility
    }

    /// Collision flags.
    #[must_use]
    pub const fn collision(&self) -> &BitGrid {
        &self.collision
    }

    /// Mutable collision flags.
    pub fn collision_mut(&mut self) -> &mut BitGrid {
        &mut self.collision
    }

    /// Occupant stacks.
    #[must_use]
    pub const fn ids(&self) -> &IdGrid {
        &self.ids
    }

    /// Mutable occupant stacks.
    pub fn ids_mut(&mut self) -> &mut IdGrid {
        &mut self.ids
    }

    /// Sets the collision bit at `local` from its tile.
    pub fn refresh_collision_at(&mut self, local: LocalPos) {
        let collides = self.tiles.get(local).collides();
        self.collision.assign(local, collides);
    }

    /// Sets every collision bit from its tile.
    pub fn refresh_collision(&mut self) {
        for local in LocalPos::all() {
            self.refresh_collision_at(local);
        }
    }
}
