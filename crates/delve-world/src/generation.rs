//! Procedural level generation.
//!
//! Every generator is a deterministic function of `(seed, depth)`. Each one
//! clears the world's overrides first and draws from its own explicitly
//! seeded [`fastrand::Rng`], so running it again reproduces byte-identical
//! overrides. Chunk diffs rely on this: they are computed against a
//! regenerated baseline rather than a stored snapshot.

use delve_common::{ChunkUv, WorldError, WorldPos, WorldResult};
use noise::{NoiseFn, Perlin};
use tracing::debug;

use crate::tile::Tile;
use crate::world::World;

/// Town side length in tiles.
pub const TOWN_SIZE: i32 = 128;

/// Cavern side length in tiles.
pub const CAVERN_SIZE: i32 = 128;

/// Test map side length in tiles.
pub const TEST_MAP_SIZE: i32 = 64;

/// Half-width of the open square around the town spawn.
pub const PLAZA_RADIUS: i32 = 10;

/// Smallest side length the town layout fits in: eight lots around the
/// plaza, each wide and tall enough for a shop and a house.
pub const MIN_TOWN_SIZE: i32 = 48;

/// Smallest side length the cavern generator accepts.
pub const MIN_CAVERN_SIZE: i32 = 8;

const SALT_TOWN: u64 = 0x746f_776e;
const SALT_CAVERN: u64 = 0x6361_7665;
const SALT_ENTITIES: u64 = 0x656e_7469;

/// Derives the seed for one generation pass.
#[must_use]
pub fn generation_seed(seed: u64, depth: i32, salt: u64) -> u64 {
    seed.wrapping_mul(0x0005_DEEC_E66D)
        .wrapping_add((depth as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(salt)
}

/// Derives the entity seed for one chunk of one level.
///
/// Loading the same chunk of the same level always regenerates the same
/// entities from this value.
#[must_use]
pub fn chunk_seed(seed: u64, depth: i32, uv: ChunkUv) -> u64 {
    generation_seed(seed, depth, SALT_ENTITIES)
        .wrapping_add((uv.u as u64).wrapping_mul(0x0123_4567))
        .wrapping_add((uv.v as u64).wrapping_mul(0x0765_4321))
}

/// Cavern generator configuration.
#[derive(Debug, Clone)]
pub struct CavernParams {
    /// Fraction of the interior carved into floor
    pub floor_fraction: f64,
    /// Ore noise frequency (larger = smaller veins)
    pub ore_scale: f64,
    /// Ore noise threshold (higher = rarer veins)
    pub ore_threshold: f64,
    /// Monsters placed at depth 1
    pub base_monsters: usize,
    /// Treasure piles placed at depth 1
    pub base_treasure: usize,
    /// Traps placed at depth 1
    pub base_traps: usize,
}

impl Default for CavernParams {
    fn default() -> Self {
        Self {
            floor_fraction: 0.4,
            ore_scale: 0.12,
            ore_threshold: 0.45,
            base_monsters: 10,
            base_treasure: 6,
            base_traps: 3,
        }
    }
}

/// Inclusive tile rectangle used while laying out the town.
#[derive(Debug, Clone, Copy)]
struct Rect {
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
}

impl Rect {
    const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    const fn overlaps(&self, other: &Self, margin: i32) -> bool {
        self.x0 - margin <= other.x1
            && other.x0 <= self.x1 + margin
            && self.y0 - margin <= other.y1
            && other.y0 <= self.y1 + margin
    }
}

impl World {
    /// Builds the level for `depth`: the town at depth 0, caverns below.
    pub fn for_depth(seed: u64, depth: i32) -> WorldResult<(Self, WorldPos)> {
        if depth <= 0 {
            let mut world = Self::new(seed, 0, TOWN_SIZE, TOWN_SIZE, Tile::Floor)?;
            let spawn = world.generate_town()?;
            Ok((world, spawn))
        } else {
            let mut world = Self::new(seed, depth, CAVERN_SIZE, CAVERN_SIZE, Tile::Wall)?;
            let spawn = world.generate_caverns(&CavernParams::default())?;
            Ok((world, spawn))
        }
    }

    /// Lays out the surface town and returns the spawn point.
    ///
    /// The town is a walled field of floor with eight shops in two rows of
    /// four lots, a few houses with doors, and a staircase down in the
    /// central plaza. The spawn is the world centre, always open floor.
    ///
    /// Fails with [`WorldError::TooSmall`] if either side is below
    /// [`MIN_TOWN_SIZE`]; the world is left untouched.
    pub fn generate_town(&mut self) -> WorldResult<WorldPos> {
        let (w, h) = (self.width(), self.height());
        if w < MIN_TOWN_SIZE || h < MIN_TOWN_SIZE {
            return Err(WorldError::TooSmall {
                width: w,
                height: h,
                min: MIN_TOWN_SIZE,
            });
        }
        let mut rng = fastrand::Rng::with_seed(generation_seed(self.seed(), self.depth(), SALT_TOWN));
        let (cx, cy) = (w / 2, h / 2);

        self.clear_overrides();
        self.set_default_tile(Tile::Floor);
        self.outline_rect(Tile::PermanentWall, 0, 0, w - 1, h - 1);

        let plaza = Rect::new(
            cx - PLAZA_RADIUS,
            cy - PLAZA_RADIUS,
            cx + PLAZA_RADIUS,
            cy + PLAZA_RADIUS,
        );
        let mut taken = vec![plaza];

        let mut shops = Tile::SHOP_FRONTS;
        rng.shuffle(&mut shops);

        let lot_w = (w - 8) / 4;
        let rows = [(4, plaza.y0 - 3), (plaza.y1 + 3, h - 5)];

        for (i, shop) in shops.into_iter().enumerate() {
            let (row, col) = (i / 4, (i % 4) as i32);
            let (ly0, ly1) = rows[row];
            let lot = Rect::new(4 + col * lot_w, ly0, 4 + col * lot_w + lot_w - 1, ly1);

            let sw = rng.i32(8..=14).min(lot.x1 - lot.x0 - 3);
            let sh = rng.i32(6..=10).min(lot.y1 - lot.y0 - 3);
            let left = rng.i32(lot.x0 + 2..=lot.x1 - 1 - sw);
            let top = rng.i32(lot.y0 + 2..=lot.y1 - 1 - sh);
            let building = Rect::new(left, top, left + sw - 1, top + sh - 1);
            self.fill_rect(
                Tile::PermanentWall,
                building.x0,
                building.y0,
                building.x1,
                building.y1,
            );

            // Entrances face the plaza.
            let door_x = rng.i32(building.x0 + 1..=building.x1 - 1);
            let door_y = if row == 0 { building.y1 } else { building.y0 };
            self.insert(shop, door_x, door_y);
            taken.push(building);

            self.place_house(&mut rng, lot, row == 0, &mut taken);
        }

        let dx = if rng.bool() {
            rng.i32(3..=6)
        } else {
            -rng.i32(3..=6)
        };
        let dy = rng.i32(-6..=6);
        self.insert(Tile::SeedStairsDown, cx + dx, cy + dy);

        let spawn = WorldPos::new(cx, cy);
        self.set_spawn(spawn);
        debug!(
            "Generated town seed={} with {} overrides",
            self.seed(),
            self.override_count()
        );
        Ok(spawn)
    }

    /// Tries to fit a small house with a door into `lot`.
    fn place_house(&mut self, rng: &mut fastrand::Rng, lot: Rect, faces_down: bool, taken: &mut Vec<Rect>) {
        const HOUSE_W: i32 = 5;
        const HOUSE_H: i32 = 4;

        for _ in 0..8 {
            let left = rng.i32(lot.x0 + 1..=lot.x1 - HOUSE_W);
            let top = rng.i32(lot.y0 + 1..=lot.y1 - HOUSE_H);
            let house = Rect::new(left, top, left + HOUSE_W - 1, top + HOUSE_H - 1);
            if taken.iter().any(|r| r.overlaps(&house, 2)) {
                continue;
            }
            self.fill_rect(Tile::PermanentWall, house.x0, house.y0, house.x1, house.y1);
            let door_y = if faces_down { house.y1 } else { house.y0 };
            self.insert(Tile::SeedDoor, house.x0 + HOUSE_W / 2, door_y);
            taken.push(house);
            return;
        }
    }

    /// Lays out the fixed test level and returns its spawn point.
    ///
    /// Three rooms joined by corridors with one of every seed tile at known
    /// positions. Uses no randomness.
    pub fn generate_test_map(&mut self) -> WorldPos {
        let (w, h) = (self.width(), self.height());

        self.clear_overrides();
        self.set_default_tile(Tile::Wall);
        self.outline_rect(Tile::PermanentWall, 0, 0, w - 1, h - 1);

        // Entry room and corridor east, closed by a door.
        self.fill_rect(Tile::Floor, 2, 2, 13, 13);
        self.fill_rect(Tile::Floor, 14, 8, 21, 8);
        self.insert(Tile::SeedDoor, 14, 8);

        // Monster hall.
        self.fill_rect(Tile::Floor, 22, 3, 41, 13);
        self.insert(Tile::SeedMonster, 30, 6);
        self.insert(Tile::SeedMonster, 35, 10);
        self.insert(Tile::SeedTreasure, 40, 4);
        self.insert(Tile::SeedTrap, 25, 12);
        self.insert(Tile::SeedTeleport, 38, 12);

        // Corridor south, blocked by rubble.
        self.fill_rect(Tile::Floor, 31, 14, 31, 33);
        self.insert(Tile::Rubble, 31, 20);

        // Stair room with a pool.
        self.fill_rect(Tile::Floor, 20, 34, 45, 50);
        self.fill_rect(Tile::Water, 26, 44, 28, 46);
        self.insert(Tile::SeedStairsUp, 21, 35);
        self.insert(Tile::SeedStairsDown, 44, 49);
        self.insert(Tile::SeedPortal, 33, 42);
        self.insert(Tile::SeedTreasure, 22, 48);
        self.insert(Tile::SeedMonster, 40, 40);

        // Ore in the surrounding rock.
        self.insert(Tile::CopperVein, 14, 2);
        self.insert(Tile::CopperVein, 14, 3);
        self.insert(Tile::SilverVein, 3, 14);
        self.insert(Tile::GoldVein, 2, 14);
        self.insert(Tile::MithrilVein, 20, 20);

        let spawn = WorldPos::new(8, 8);
        self.set_spawn(spawn);
        spawn
    }

    /// Carves a cave level and returns the spawn point.
    ///
    /// A drunkard's walk from the centre carves floor out of rock, Perlin
    /// noise threads ore veins through what is left, then monsters,
    /// treasure, traps, stairs, a teleporter and doors are seeded on
    /// floor cells. Deeper levels get more of everything and richer ore.
    ///
    /// Fails with [`WorldError::TooSmall`] if either side is below
    /// [`MIN_CAVERN_SIZE`].
    pub fn generate_caverns(&mut self, params: &CavernParams) -> WorldResult<WorldPos> {
        let (w, h) = (self.width(), self.height());
        if w < MIN_CAVERN_SIZE || h < MIN_CAVERN_SIZE {
            return Err(WorldError::TooSmall {
                width: w,
                height: h,
                min: MIN_CAVERN_SIZE,
            });
        }
        let seed = generation_seed(self.seed(), self.depth(), SALT_CAVERN);
        let mut rng = fastrand::Rng::with_seed(seed);
        let depth = self.depth().max(1);
        let spawn = WorldPos::new(w / 2, h / 2);

        self.clear_overrides();
        self.set_default_tile(Tile::Wall);
        self.outline_rect(Tile::PermanentWall, 0, 0, w - 1, h - 1);

        let interior = f64::from((w - 2).max(0) * (h - 2).max(0));
        let target = (interior * params.floor_fraction) as usize;
        let mut carved = 0usize;
        let mut pos = spawn;
        for _ in 0..target.saturating_mul(20) {
            if carved >= target {
                break;
            }
            if self.lookup(pos.x, pos.y) != Tile::Floor {
                self.insert(Tile::Floor, pos.x, pos.y);
                carved += 1;
            }
            let (dx, dy) = match rng.u8(0..4) {
                0 => (1, 0),
                1 => (-1, 0),
                2 => (0, 1),
                _ => (0, -1),
            };
            pos = WorldPos::new((pos.x + dx).clamp(1, w - 2), (pos.y + dy).clamp(1, h - 2));
        }

        let ore = Perlin::new(seed as u32);
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                if self.lookup(x, y) != Tile::Wall {
                    continue;
                }
                let value = ore.get([f64::from(x) * params.ore_scale, f64::from(y) * params.ore_scale]);
                if value > params.ore_threshold {
                    self.insert(vein_for(value, depth), x, y);
                }
            }
        }

        let mut floor: Vec<WorldPos> = (1..h - 1)
            .flat_map(|y| (1..w - 1).map(move |x| WorldPos::new(x, y)))
            .filter(|p| self.lookup(p.x, p.y) == Tile::Floor && p.chebyshev(spawn) > 1)
            .collect();

        let doors: Vec<WorldPos> = floor
            .iter()
            .copied()
            .filter(|p| self.is_corridor(*p))
            .collect();
        for _ in 0..4 {
            if doors.is_empty() {
                break;
            }
            let at = doors[rng.usize(..doors.len())];
            if self.lookup(at.x, at.y) == Tile::Floor {
                self.insert(Tile::SeedDoor, at.x, at.y);
                floor.retain(|p| *p != at);
            }
        }

        let scale = usize::try_from(depth - 1).unwrap_or(0);
        let placements = [
            (Tile::SeedMonster, (params.base_monsters + 2 * scale).min(40)),
            (Tile::SeedTreasure, params.base_treasure + scale / 2),
            (Tile::SeedTrap, (params.base_traps + scale).min(20)),
            (Tile::SeedStairsUp, 1),
            (Tile::SeedTeleport, 2),
            (Tile::SeedPortal, usize::from(depth % 5 == 0)),
        ];
        for (tile, count) in placements {
            for _ in 0..count {
                if floor.is_empty() {
                    break;
                }
                let at = floor.swap_remove(rng.usize(..floor.len()));
                self.insert(tile, at.x, at.y);
            }
        }

        let far: Vec<usize> = (0..floor.len())
            .filter(|&i| floor[i].chebyshev(spawn) > 30)
            .collect();
        let pick = if far.is_empty() {
            (!floor.is_empty()).then(|| rng.usize(..floor.len()))
        } else {
            Some(far[rng.usize(..far.len())])
        };
        if let Some(i) = pick {
            let at = floor[i];
            self.insert(Tile::SeedStairsDown, at.x, at.y);
        }

        self.set_spawn(spawn);
        debug!(
            "Generated caverns seed={} depth={} carved={} overrides={}",
            self.seed(),
            self.depth(),
            carved,
            self.override_count()
        );
        Ok(spawn)
    }

    /// Floor cell squeezed between two walls on one axis and open on the other.
    fn is_corridor(&self, p: WorldPos) -> bool {
        let open = |x: i32, y: i32| !self.lookup(x, y).collides();
        let horizontal = !open(p.x - 1, p.y) && !open(p.x + 1, p.y) && open(p.x, p.y - 1) && open(p.x, p.y + 1);
        let vertical = !open(p.x, p.y - 1) && !open(p.x, p.y + 1) && open(p.x - 1, p.y) && open(p.x + 1, p.y);
        horizontal || vertical
    }
}

/// Picks the vein for a noise sample; deeper levels unlock richer ore.
fn vein_for(value: f64, depth: i32) -> Tile {
    let richness = value + f64::from(depth) * 0.02;
    match richness {
        r if r > 0.9 && depth >= 10 => Tile::MithrilVein,
        r if r > 0.75 && depth >= 6 => Tile::GoldVein,
        r if r > 0.6 && depth >= 3 => Tile::SilverVein,
        _ => Tile::CopperVein,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn town(seed: u64) -> (World, WorldPos) {
        let mut world = World::new(seed, 0, TOWN_SIZE, TOWN_SIZE, Tile::Floor).expect("valid world");
        let spawn = world.generate_town().expect("town fits");
        (world, spawn)
    }

    #[test]
    fn test_town_deterministic() {
        let (a, spawn_a) = town(1337);
        let (b, spawn_b) = town(1337);
        assert_eq!(spawn_a, spawn_b);
        assert_eq!(a.overrides(), b.overrides());
    }

    #[test]
    fn test_town_regeneration_is_identical() {
        let (mut world, _) = town(1337);
        let first = world.overrides();
        world.insert(Tile::Rubble, 50, 50);
        world.generate_town().expect("town fits");
        assert_eq!(world.overrides(), first);
    }

    #[test]
    fn test_different_seeds_different_town() {
        let (a, _) = town(42);
        let (b, _) = town(999);
        assert_ne!(a.overrides(), b.overrides());
    }

    #[test]
    fn test_town_layout() {
        let (world, spawn) = town(1337);
        assert_eq!(spawn, WorldPos::new(64, 64));
        assert_eq!(world.lookup(spawn.x, spawn.y), Tile::Floor);
        assert_eq!(world.lookup(0, 0), Tile::PermanentWall);
        assert_eq!(world.lookup(127, 64), Tile::PermanentWall);

        let overrides = world.overrides();
        for shop in Tile::SHOP_FRONTS {
            assert_eq!(
                overrides.iter().filter(|(_, t)| *t == shop).count(),
                1,
                "{shop:?}"
            );
        }
        let stairs: Vec<_> = overrides
            .iter()
            .filter(|(_, t)| *t == Tile::SeedStairsDown)
            .collect();
        assert_eq!(stairs.len(), 1);
        assert!(stairs[0].0.chebyshev(spawn) <= 6);
        assert!(overrides.iter().any(|(_, t)| *t == Tile::SeedDoor));
    }

    #[test]
    fn test_town_rejects_small_world() {
        let mut world = World::new(1, 0, 32, 32, Tile::Floor).expect("valid world");
        assert!(matches!(
            world.generate_town(),
            Err(WorldError::TooSmall { width: 32, height: 32, min: MIN_TOWN_SIZE })
        ));
        assert_eq!(world.override_count(), 0);

        let mut narrow = World::new(1, 0, MIN_TOWN_SIZE - 1, TOWN_SIZE, Tile::Floor).expect("valid world");
        assert!(narrow.generate_town().is_err());
    }

    #[test]
    fn test_town_fits_every_size_from_minimum() {
        for seed in 0..8 {
            for (w, h) in [
                (MIN_TOWN_SIZE, MIN_TOWN_SIZE),
                (MIN_TOWN_SIZE, 97),
                (61, MIN_TOWN_SIZE),
                (53, 50),
                (TOWN_SIZE, MIN_TOWN_SIZE + 1),
            ] {
                let mut world = World::new(seed, 0, w, h, Tile::Floor).expect("valid world");
                let spawn = world.generate_town().expect("town fits");
                assert_eq!(world.lookup(spawn.x, spawn.y), Tile::Floor, "{w}x{h}");
            }
        }
    }

    #[test]
    fn test_caverns_reject_tiny_world() {
        let mut world = World::new(1, 2, 2, 2, Tile::Wall).expect("valid world");
        assert!(matches!(
            world.generate_caverns(&CavernParams::default()),
            Err(WorldError::TooSmall { min: MIN_CAVERN_SIZE, .. })
        ));
        let mut small = World::new(1, 2, MIN_CAVERN_SIZE, MIN_CAVERN_SIZE, Tile::Wall).expect("valid world");
        assert!(small.generate_caverns(&CavernParams::default()).is_ok());
    }

    #[test]
    fn test_town_plaza_clear() {
        let (world, spawn) = town(7);
        for y in -2..=2 {
            for x in -2..=2 {
                assert_eq!(world.lookup(spawn.x + x, spawn.y + y), Tile::Floor);
            }
        }
    }

    #[test]
    fn test_test_map_contents() {
        let mut world = World::new(0, 1, TEST_MAP_SIZE, TEST_MAP_SIZE, Tile::Floor).expect("valid world");
        let spawn = world.generate_test_map();
        assert_eq!(spawn, WorldPos::new(8, 8));
        assert_eq!(world.default_tile(), Tile::Wall);
        assert_eq!(world.lookup(8, 8), Tile::Floor);
        assert_eq!(world.lookup(14, 8), Tile::SeedDoor);
        assert_eq!(world.lookup(31, 20), Tile::Rubble);
        assert_eq!(world.lookup(27, 45), Tile::Water);
        assert_eq!(world.lookup(60, 60), Tile::Wall);

        let seeds = world
            .overrides()
            .into_iter()
            .filter(|(_, t)| t.is_entity_seed())
            .count();
        assert_eq!(seeds, 11);
    }

    #[test]
    fn test_caverns_deterministic() {
        let build = || {
            let mut world = World::new(99, 4, CAVERN_SIZE, CAVERN_SIZE, Tile::Wall).expect("valid world");
            let spawn = world
                .generate_caverns(&CavernParams::default())
                .expect("caverns fit");
            (world.overrides(), spawn)
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_caverns_contents() {
        let (world, spawn) = World::for_depth(5, 3).expect("valid world");
        assert_eq!(world.depth(), 3);
        assert_eq!(world.lookup(spawn.x, spawn.y), Tile::Floor);
        let overrides = world.overrides();
        let count = |tile: Tile| overrides.iter().filter(|(_, t)| *t == tile).count();
        assert_eq!(count(Tile::SeedStairsDown), 1);
        assert_eq!(count(Tile::SeedStairsUp), 1);
        assert_eq!(count(Tile::SeedMonster), 14);
        assert!(count(Tile::Floor) > 1000);
    }

    #[test]
    fn test_for_depth_town() {
        let (world, spawn) = World::for_depth(1337, 0).expect("valid world");
        assert_eq!(world.depth(), 0);
        assert_eq!(world.width(), TOWN_SIZE);
        assert_eq!(spawn, world.spawn());
    }

    #[test]
    fn test_chunk_seed_varies() {
        let a = chunk_seed(1, 0, ChunkUv::new(0, 0));
        assert_eq!(a, chunk_seed(1, 0, ChunkUv::new(0, 0)));
        assert_ne!(a, chunk_seed(1, 0, ChunkUv::new(1, 0)));
        assert_ne!(a, chunk_seed(1, 0, ChunkUv::new(0, 1)));
        assert_ne!(a, chunk_seed(1, 1, ChunkUv::new(0, 0)));
        assert_ne!(a, chunk_seed(2, 0, ChunkUv::new(0, 0)));
    }

    #[test]
    fn test_vein_for_depth() {
        assert_eq!(vein_for(0.95, 1), Tile::CopperVein);
        assert_eq!(vein_for(0.95, 12), Tile::MithrilVein);
        assert_eq!(vein_for(0.7, 6), Tile::GoldVein);
    }
}
