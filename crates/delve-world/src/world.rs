//! The world template: an unbounded tile plane for one dungeon level.
//!
//! A [`World`] is a default tile plus a sparse map of authored overrides. It
//! never holds entities; seed tiles in the template are turned into entities
//! by the chunk manager when their chunk first loads.

use ahash::AHashMap;
use delve_common::{WorldError, WorldPos, WorldResult, CHUNK_SIZE};

use crate::tile::Tile;

/// Tile template for one dungeon level.
#[derive(Debug, Clone)]
pub struct World {
    /// Generation seed
    seed: u64,
    /// Dungeon depth (0 = town)
    depth: i32,
    /// Tile returned where no override exists
    default_tile: Tile,
    /// Tile an entity seed becomes once its entity is spawned
    floor_tile: Tile,
    /// Authored tiles keyed by [`WorldPos::pack`]
    overrides: AHashMap<u64, Tile>,
    /// Width in tiles
    width: i32,
    /// Height in tiles
    height: i32,
    /// Where the player enters this level
    spawn: WorldPos,
}

impl World {
    /// Creates an empty world of `width`×`height` tiles.
    pub fn new(
        seed: u64,
        depth: i32,
        width: i32,
        height: i32,
        default_tile: Tile,
    ) -> WorldResult<Self> {
        if width <= 0 || height <= 0 {
            return Err(WorldError::InvalidDimensions { width, height });
        }
        Ok(Self {
            seed,
            depth,
            default_tile,
            floor_tile: Tile::Floor,
            overrides: AHashMap::new(),
            width,
            height,
            spawn: WorldPos::new(width / 2, height / 2),
        })
    }

    /// Generation seed.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Dungeon depth.
    #[must_use]
    pub const fn depth(&self) -> i32 {
        self.depth
    }

    /// Width in tiles.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Height in tiles.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// Width in chunks, rounded up.
    #[must_use]
    pub const fn width_in_chunks(&self) -> i32 {
        (self.width + CHUNK_SIZE - 1) / CHUNK_SIZE
    }

    /// Height in chunks, rounded up.
    #[must_use]
    pub const fn height_in_chunks(&self) -> i32 {
        (self.height + CHUNK_SIZE - 1) / CHUNK_SIZE
    }

    /// Background tile.
    #[must_use]
    pub const fn default_tile(&self) -> Tile {
        self.default_tile
    }

    /// Changes the background tile.
    pub fn set_default_tile(&mut self, tile: Tile) {
        self.default_tile = tile;
    }

    /// Tile left behind by a spawned entity seed.
    #[must_use]
    pub const fn floor_tile(&self) -> Tile {
        self.floor_tile
    }

    /// Player entry point.
    #[must_use]
    pub const fn spawn(&self) -> WorldPos {
        self.spawn
    }

    pub(crate) fn set_spawn(&mut self, spawn: WorldPos) {
        self.spawn = spawn;
    }

    /// Whether `pos` lies inside the level.
    #[must_use]
    pub const fn in_bounds(&self, pos: WorldPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    /// Template tile at `(x, y)`.
    #[must_use]
    pub fn lookup(&self, x: i32, y: i32) -> Tile {
        self.overrides
            .get(&WorldPos::new(x, y).pack())
            .copied()
            .unwrap_or(self.default_tile)
    }

    /// Tile a freshly loaded chunk shows at `(x, y)` before any diff.
    ///
    /// Seed cells read as the floor tile.
    #[must_use]
    pub fn baseline(&self, x: i32, y: i32) -> Tile {
        let tile = self.lookup(x, y);
        if tile.is_entity_seed() {
            self.floor_tile
        } else {
            tile
        }
    }

    /// Authors `tile` at `(x, y)`; returns the previous override.
    pub fn insert(&mut self, tile: Tile, x: i32, y: i32) -> Option<Tile> {
        self.overrides.insert(WorldPos::new(x, y).pack(), tile)
    }

    /// Removes the override at `(x, y)`; returns it.
    pub fn delete(&mut self, x: i32, y: i32) -> Option<Tile> {
        self.overrides.remove(&WorldPos::new(x, y).pack())
    }

    /// Drops every override.
    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    /// Number of authored tiles.
    #[must_use]
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    /// Authored tiles sorted by position.
    #[must_use]
    pub fn overrides(&self) -> Vec<(WorldPos, Tile)> {
        let mut out: Vec<_> = self
            .overrides
            .iter()
            .map(|(&key, &tile)| (WorldPos::unpack(key), tile))
            .collect();
        out.sort_unstable_by_key(|&(pos, _)| (pos.y, pos.x));
        out
    }

    /// Fills the rectangle `[x0, x1] × [y0, y1]` with `tile`.
    pub fn fill_rect(&mut self, tile: Tile, x0: i32, y0: i32, x1: i32, y1: i32) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.insert(tile, x, y);
            }
        }
    }

    /// Draws the outline of `[x0, x1] × [y0, y1]` with `tile`.
    pub fn outline_rect(&mut self, tile: Tile, x0: i32, y0: i32, x1: i32, y1: i32) {
        for x in x0..=x1 {
            self.insert(tile, x, y0);
            self.insert(tile, x, y1);
        }
        for y in y0..=y1 {
            self.insert(tile, x0, y);
            self.insert(tile, x1, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_dimensions() {
        assert!(World::new(1, 0, 0, 10, Tile::Floor).is_err());
        assert!(World::new(1, 0, 10, -1, Tile::Floor).is_err());
    }

    #[test]
    fn test_lookup_default_and_override() {
        let mut world = World::new(1, 0, 32, 32, Tile::Wall).expect("valid world");
        assert_eq!(world.lookup(3, 3), Tile::Wall);
        assert_eq!(world.lookup(-100, 5000), Tile::Wall);

        assert_eq!(world.insert(Tile::Floor, 3, 3), None);
        assert_eq!(world.lookup(3, 3), Tile::Floor);
        assert_eq!(world.insert(Tile::Rubble, 3, 3), Some(Tile::Floor));
        assert_eq!(world.override_count(), 1);

        assert_eq!(world.delete(3, 3), Some(Tile::Rubble));
        assert_eq!(world.delete(3, 3), None);
        assert_eq!(world.lookup(3, 3), Tile::Wall);
    }

    #[test]
    fn test_baseline_hides_seeds() {
        let mut world = World::new(1, 0, 16, 16, Tile::Floor).expect("valid world");
        world.insert(Tile::SeedMonster, 2, 2);
        assert_eq!(world.lookup(2, 2), Tile::SeedMonster);
        assert_eq!(world.baseline(2, 2), Tile::Floor);
        world.insert(Tile::Wall, 3, 2);
        assert_eq!(world.baseline(3, 2), Tile::Wall);
    }

    #[test]
    fn test_chunk_dimensions_round_up() {
        let world = World::new(1, 0, 33, 16, Tile::Floor).expect("valid world");
        assert_eq!(world.width_in_chunks(), 3);
        assert_eq!(world.height_in_chunks(), 1);
        assert!(world.in_bounds(WorldPos::new(32, 15)));
        assert!(!world.in_bounds(WorldPos::new(33, 0)));
        assert!(!world.in_bounds(WorldPos::new(0, -1)));
    }

    #[test]
    fn test_rect_helpers() {
        let mut world = World::new(1, 0, 16, 16, Tile::Floor).expect("valid world");
        world.outline_rect(Tile::Wall, 0, 0, 3, 3);
        assert_eq!(world.override_count(), 12);
        assert_eq!(world.lookup(1, 1), Tile::Floor);
        world.fill_rect(Tile::Water, 1, 1, 2, 2);
        assert_eq!(world.lookup(2, 2), Tile::Water);
        assert_eq!(world.override_count(), 16);
        let overrides = world.overrides();
        assert_eq!(overrides[0], (WorldPos::new(0, 0), Tile::Wall));
    }
}
