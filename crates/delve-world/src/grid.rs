//! Fixed-size grid primitives backing a chunk.
//!
//! - [`TileGrid`]: one byte per cell
//! - [`BitGrid`]: one bit per cell, packed eight to a byte
//! - [`IdGrid`]: sparse per-cell LIFO stacks of entity ids
//!
//! Cells are addressed by [`LocalPos`] in row-major order. Positions outside
//! `[0, size)` are a caller bug and panic on the slice bound.

use std::collections::BTreeMap;

use delve_common::{EntityId, LocalPos};

use crate::tile::Tile;

/// Square grid of tiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    size: usize,
    cells: Vec<Tile>,
}

impl TileGrid {
    /// Creates a `size`×`size` grid filled with [`Tile::Void`].
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![Tile::Void; size * size],
        }
    }

    /// Side length.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Tile at `local`.
    #[must_use]
    pub fn get(&self, local: LocalPos) -> Tile {
        self.cells[local.to_index(self.size)]
    }

    /// Writes the tile at `local`.
    pub fn set(&mut self, local: LocalPos, tile: Tile) {
        let index = local.to_index(self.size);
        self.cells[index] = tile;
    }

    /// Writes the tile at `local` and returns the previous one.
    pub fn replace(&mut self, local: LocalPos, tile: Tile) -> Tile {
        let index = local.to_index(self.size);
        std::mem::replace(&mut self.cells[index], tile)
    }

    /// Overwrites every cell.
    pub fn fill(&mut self, tile: Tile) {
        self.cells.fill(tile);
    }

    /// Row-major view of every cell.
    #[must_use]
    pub fn as_slice(&self) -> &[Tile] {
        &self.cells
    }
}

/// Square grid of boolean flags, packed eight per byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitGrid {
    size: usize,
    bits: Vec<u8>,
}

impl BitGrid {
    /// Creates a `size`×`size` grid with every bit clear.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            bits: vec![0; (size * size).div_ceil(8)],
        }
    }

    /// Side length.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn locate(&self, local: LocalPos) -> (usize, u8) {
        let index = local.to_index(self.size);
        (index / 8, 1 << (index % 8))
    }

    /// Bit at `local`.
    #[must_use]
    pub fn get(&self, local: LocalPos) -> bool {
        let (byte, mask) = self.locate(local);
        self.bits[byte] & mask != 0
    }

    /// Sets the bit at `local`; returns the previous value.
    pub fn set(&mut self, local: LocalPos) -> bool {
        self.assign(local, true)
    }

    /// Clears the bit at `local`; returns the previous value.
    pub fn clear(&mut self, local: LocalPos) -> bool {
        self.assign(local, false)
    }

    /// Flips the bit at `local`; returns the new value.
    pub fn toggle(&mut self, local: LocalPos) -> bool {
        let (byte, mask) = self.locate(local);
        self.bits[byte] ^= mask;
        self.bits[byte] & mask != 0
    }

    /// Writes `value` at `local`; returns the previous value.
    pub fn assign(&mut self, local: LocalPos, value: bool) -> bool {
        let (byte, mask) = self.locate(local);
        let previous = self.bits[byte] & mask != 0;
        if value {
            self.bits[byte] |= mask;
        } else {
            self.bits[byte] &= !mask;
        }
        previous
    }

    /// Clears every bit.
    pub fn clear_all(&mut self) {
        self.bits.fill(0);
    }

    /// Number of set bits.
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Packed backing bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }
}

/// Sparse per-cell stacks of entity ids.
///
/// The last element of a stack is its top. A tile can hold a terrain feature
/// (a door) under a transient occupant (a monster standing in the doorway).
/// Empty stacks are dropped from the map so iteration only visits occupied
/// cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdGrid {
    size: usize,
    stacks: BTreeMap<usize, Vec<EntityId>>,
}

impl IdGrid {
    /// Creates an empty `size`×`size` id grid.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            stacks: BTreeMap::new(),
        }
    }

    /// Pushes `id` on top of the stack at `local`.
    pub fn push(&mut self, local: LocalPos, id: EntityId) {
        self.stacks
            .entry(local.to_index(self.size))
            .or_default()
            .push(id);
    }

    /// Removes and returns the top id at `local`.
    pub fn pop(&mut self, local: LocalPos) -> Option<EntityId> {
        let index = local.to_index(self.size);
        let stack = self.stacks.get_mut(&index)?;
        let id = stack.pop();
        if stack.is_empty() {
            self.stacks.remove(&index);
        }
        id
    }

    /// Top id at `local`.
    #[must_use]
    pub fn top(&self, local: LocalPos) -> Option<EntityId> {
        self.stack(local).last().copied()
    }

    /// Replaces the top id at `local`, returning the previous top.
    ///
    /// On an empty cell this pushes `id` and returns `None`.
    pub fn replace_top(&mut self, local: LocalPos, id: EntityId) -> Option<EntityId> {
        let stack = self.stacks.entry(local.to_index(self.size)).or_default();
        match stack.last_mut() {
            Some(top) => Some(std::mem::replace(top, id)),
            None => {
                stack.push(id);
                None
            },
        }
    }

    /// Inserts `id` directly below the top of the stack at `local`.
    ///
    /// On an empty cell `id` becomes the only entry.
    pub fn insert_below_top(&mut self, local: LocalPos, id: EntityId) {
        let stack = self.stacks.entry(local.to_index(self.size)).or_default();
        let at = stack.len().saturating_sub(1);
        stack.insert(at, id);
    }

    /// Removes `id` wherever it sits in the stack at `local`.
    pub fn remove(&mut self, local: LocalPos, id: EntityId) -> bool {
        let index = local.to_index(self.size);
        let Some(stack) = self.stacks.get_mut(&index) else {
            return false;
        };
        let Some(at) = stack.iter().rposition(|&e| e == id) else {
            return false;
        };
        stack.remove(at);
        if stack.is_empty() {
            self.stacks.remove(&index);
        }
        true
    }

    /// Stack at `local`, bottom first.
    #[must_use]
    pub fn stack(&self, local: LocalPos) -> &[EntityId] {
        self.stacks
            .get(&local.to_index(self.size))
            .map_or(&[][..], Vec::as_slice)
    }

    /// Occupied cells in row-major order with their stacks, bottom first.
    pub fn iter(&self) -> impl Iterator<Item = (LocalPos, &[EntityId])> + '_ {
        self.stacks
            .iter()
            .map(|(&index, stack)| (LocalPos::from_index(index, self.size), stack.as_slice()))
    }

    /// Drops every stack.
    pub fn clear(&mut self) {
        self.stacks.clear();
    }

    /// True when no cell holds an id.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Total number of ids across all stacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.values().map(Vec::len).sum()
    }
}
