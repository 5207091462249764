//! Live game objects.
//!
//! An [`Entity`] is a small common header (id, position, collision and
//! visibility flags) plus an [`EntityKind`] carrying only the fields of its
//! archetype. Entities materialize from seed tiles through
//! [`spawn_from_seed`], or are created directly by the game.

use delve_common::{Archetype, EntityId, WorldPos};
use serde::{Deserialize, Serialize};

use crate::tile::Tile;

/// What a door is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoorMaterial {
    /// Wooden door
    Wood,
    /// Iron-bound door
    Iron,
    /// Stone slab
    Stone,
}

impl DoorMaterial {
    /// Hitpoints before the door breaks.
    #[must_use]
    pub const fn hitpoints(self) -> u32 {
        match self {
            Self::Wood => 10,
            Self::Iron => 30,
            Self::Stone => 50,
        }
    }
}

/// Door lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lock {
    /// Opens freely
    Unlocked,
    /// Needs picking; the value is the difficulty
    Locked(u8),
}

/// Kind of trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrapKind {
    /// Drops the victim a level
    TrapDoor,
    /// Open pit
    Pit,
    /// Poisoned dart
    Dart,
    /// Fire rune
    Fire,
    /// Cloud of poison gas
    Gas,
    /// Summons monsters nearby
    Summon,
}

impl TrapKind {
    const ALL: [Self; 6] = [
        Self::TrapDoor,
        Self::Pit,
        Self::Dart,
        Self::Fire,
        Self::Gas,
        Self::Summon,
    ];
}

/// Which way a staircase leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StairDirection {
    /// Towards the surface
    Up,
    /// Deeper
    Down,
}

/// Kind of treasure pile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreasureKind {
    /// Copper coins
    Copper,
    /// Silver coins
    Silver,
    /// Gold coins
    Gold,
    /// Gems
    Gems,
}

impl TreasureKind {
    const fn base_value(self) -> u32 {
        match self {
            Self::Copper => 5,
            Self::Silver => 20,
            Self::Gold => 60,
            Self::Gems => 200,
        }
    }
}

/// Saving throws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Saves {
    /// Against poison and disease
    pub fortitude: i16,
    /// Against traps and breath
    pub reflex: i16,
    /// Against spells
    pub will: i16,
}

/// Damage types a monster shrugs off, as a bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Immunities(u8);

impl Immunities {
    /// No immunities
    pub const NONE: Self = Self(0);
    /// Fire damage
    pub const FIRE: Self = Self(1 << 0);
    /// Cold damage
    pub const COLD: Self = Self(1 << 1);
    /// Poison damage
    pub const POISON: Self = Self(1 << 2);
    /// Acid damage
    pub const ACID: Self = Self(1 << 3);
    /// Lightning damage
    pub const LIGHTNING: Self = Self(1 << 4);

    /// Union of two sets.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every immunity in `other` is present.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Monster race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonsterRace {
    /// Scruffy dog
    Jackal,
    /// Giant rat
    Rat,
    /// Small kobold
    Kobold,
    /// Cave spider
    CaveSpider,
    /// Orc soldier
    Orc,
    /// Wolf
    Wolf,
    /// Hill giant
    Ogre,
    /// Cave troll
    Troll,
    /// Fire hound
    FireHound,
    /// Wraith
    Wraith,
    /// Young dragon
    Dragon,
}

impl MonsterRace {
    /// Every race, shallowest first.
    pub const ALL: [Self; 11] = [
        Self::Jackal,
        Self::Rat,
        Self::Kobold,
        Self::CaveSpider,
        Self::Orc,
        Self::Wolf,
        Self::Ogre,
        Self::Troll,
        Self::FireHound,
        Self::Wraith,
        Self::Dragon,
    ];

    /// Shallowest depth the race appears at.
    #[must_use]
    pub const fn native_depth(self) -> i32 {
        match self {
            Self::Jackal | Self::Rat => 0,
            Self::Kobold => 1,
            Self::CaveSpider => 2,
            Self::Orc => 4,
            Self::Wolf => 6,
            Self::Ogre => 9,
            Self::Troll => 12,
            Self::FireHound => 15,
            Self::Wraith => 20,
            Self::Dragon => 28,
        }
    }

    /// Sides of the hit die rolled once per level.
    #[must_use]
    pub const fn hit_die(self) -> u32 {
        match self {
            Self::Jackal | Self::Rat => 4,
            Self::Kobold | Self::CaveSpider => 6,
            Self::Orc | Self::Wolf => 8,
            Self::Ogre | Self::FireHound => 10,
            Self::Troll | Self::Wraith => 12,
            Self::Dragon => 20,
        }
    }

    /// Base armour class.
    #[must_use]
    pub const fn armor_class(self) -> u16 {
        match self {
            Self::Jackal | Self::Rat => 3,
            Self::Kobold => 12,
            Self::CaveSpider => 16,
            Self::Orc => 36,
            Self::Wolf => 30,
            Self::Ogre => 33,
            Self::Troll => 40,
            Self::FireHound => 30,
            Self::Wraith => 45,
            Self::Dragon => 60,
        }
    }

    /// Innate immunities.
    #[must_use]
    pub const fn immunities(self) -> Immunities {
        match self {
            Self::CaveSpider => Immunities::POISON,
            Self::FireHound => Immunities::FIRE,
            Self::Wraith => Immunities::COLD.with(Immunities::POISON),
            Self::Dragon => Immunities::FIRE.with(Immunities::ACID),
            _ => Immunities::NONE,
        }
    }
}

/// Archetype-specific state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// Door
    Door {
        /// What it is made of
        material: DoorMaterial,
        /// Lock state
        lock: Lock,
        /// Trap fired when forced
        trap: Option<TrapKind>,
        /// Whether the door stands open
        open: bool,
        /// Jammed shut
        stuck: bool,
        /// Damage left before it breaks
        hitpoints: u32,
    },
    /// Monster
    Monster {
        /// Race
        race: MonsterRace,
        /// Experience level
        level: u32,
        /// Current hitpoints
        hitpoints: u32,
        /// Maximum hitpoints
        max_hitpoints: u32,
        /// Armour class
        armor_class: u16,
        /// Saving throws
        saves: Saves,
        /// Damage immunities
        immunities: Immunities,
    },
    /// The player character
    Player {
        /// Character name
        name: String,
        /// Experience level
        level: u32,
        /// Current hitpoints
        hitpoints: u32,
        /// Maximum hitpoints
        max_hitpoints: u32,
        /// Gold carried
        gold: u32,
    },
    /// Magic portal
    Portal {
        /// Depth it leads to
        destination_depth: i32,
    },
    /// Staircase
    Stairs {
        /// Up or down
        direction: StairDirection,
    },
    /// Teleporter pad
    Teleport {
        /// Arrival point on the same level
        destination: WorldPos,
    },
    /// Trap
    Trap {
        /// Trap effect
        kind: TrapKind,
        /// Not yet spotted
        hidden: bool,
        /// Rendered harmless
        disarmed: bool,
        /// Damage dealt when triggered
        damage: u32,
    },
    /// Treasure pile
    Treasure {
        /// What the pile holds
        kind: TreasureKind,
        /// Value in gold
        gold: u32,
    },
}

impl EntityKind {
    /// Archetype of this kind.
    #[must_use]
    pub const fn archetype(&self) -> Archetype {
        match self {
            Self::Door { .. } => Archetype::Door,
            Self::Monster { .. } => Archetype::Monster,
            Self::Player { .. } => Archetype::Player,
            Self::Portal { .. } => Archetype::Portal,
            Self::Stairs { .. } => Archetype::Stairs,
            Self::Teleport { .. } => Archetype::Teleport,
            Self::Trap { .. } => Archetype::Trap,
            Self::Treasure { .. } => Archetype::Treasure,
        }
    }

    /// Whether an entity of this kind blocks movement by default.
    #[must_use]
    pub const fn default_collision(&self) -> bool {
        match self {
            Self::Door { open, .. } => !*open,
            Self::Monster { .. } | Self::Player { .. } => true,
            _ => false,
        }
    }

    /// Whether an entity of this kind is drawn by default.
    #[must_use]
    pub const fn default_visibility(&self) -> bool {
        !matches!(self, Self::Trap { hidden: true, .. })
    }
}

/// A live game object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Handle assigned by the entity manager; NULL until inserted
    pub id: EntityId,
    /// World position
    pub position: WorldPos,
    /// Blocks movement into its cell
    pub collision: bool,
    /// Drawn to the player
    pub visible: bool,
    /// Archetype-specific state
    pub kind: EntityKind,
}

impl Entity {
    /// Creates an entity with the kind's default flags.
    #[must_use]
    pub fn new(position: WorldPos, kind: EntityKind) -> Self {
        Self {
            id: EntityId::NULL,
            position,
            collision: kind.default_collision(),
            visible: kind.default_visibility(),
            kind,
        }
    }

    /// Creates a fresh level-1 player character.
    #[must_use]
    pub fn player(name: impl Into<String>, position: WorldPos) -> Self {
        Self::new(
            position,
            EntityKind::Player {
                name: name.into(),
                level: 1,
                hitpoints: 20,
                max_hitpoints: 20,
                gold: 0,
            },
        )
    }

    /// Archetype of this entity.
    #[must_use]
    pub const fn archetype(&self) -> Archetype {
        self.kind.archetype()
    }

    /// Opens a closed door.
    ///
    /// Returns false for anything that is not a closed, unlocked, free door.
    pub fn open(&mut self) -> bool {
        if let EntityKind::Door {
            open,
            lock: Lock::Unlocked,
            stuck: false,
            ..
        } = &mut self.kind
        {
            if !*open {
                *open = true;
                self.collision = false;
                return true;
            }
        }
        false
    }

    /// Gold carried or held, if this entity has any.
    #[must_use]
    pub const fn gold(&self) -> Option<u32> {
        match &self.kind {
            EntityKind::Player { gold, .. } | EntityKind::Treasure { gold, .. } => Some(*gold),
            _ => None,
        }
    }
}

/// Generates the entity a seed tile stands for.
///
/// Draws only from `rng`, so a chunk RNG seeded the same way reproduces the
/// same entities. `bounds` is the level size, used to pick teleport targets.
/// Returns `None` for tiles that are not seeds.
pub fn spawn_from_seed(
    tile: Tile,
    position: WorldPos,
    depth: i32,
    rng: &mut fastrand::Rng,
    bounds: (i32, i32),
) -> Option<Entity> {
    let depth = depth.max(0);
    let kind = match tile {
        Tile::SeedDoor => roll_door(depth, rng),
        Tile::SeedMonster => roll_monster(depth, rng),
        Tile::SeedPortal => EntityKind::Portal {
            destination_depth: depth + rng.i32(2..=5),
        },
        Tile::SeedStairsUp => EntityKind::Stairs {
            direction: StairDirection::Up,
        },
        Tile::SeedStairsDown => EntityKind::Stairs {
            direction: StairDirection::Down,
        },
        Tile::SeedTeleport => EntityKind::Teleport {
            destination: WorldPos::new(
                rng.i32(1..bounds.0.max(3) - 1),
                rng.i32(1..bounds.1.max(3) - 1),
            ),
        },
        Tile::SeedTrap => EntityKind::Trap {
            kind: TrapKind::ALL[rng.usize(..TrapKind::ALL.len())],
            hidden: rng.u8(0..3) != 0,
            disarmed: false,
            damage: rng.u32(1..=6) * (1 + depth.unsigned_abs() / 2),
        },
        Tile::SeedTreasure => roll_treasure(depth, rng),
        _ => return None,
    };
    Some(Entity::new(position, kind))
}

fn roll_door(depth: i32, rng: &mut fastrand::Rng) -> EntityKind {
    let material = match rng.u8(0..10) {
        0..=5 => DoorMaterial::Wood,
        6..=8 => DoorMaterial::Iron,
        _ => DoorMaterial::Stone,
    };
    let lock = if rng.u8(0..4) == 0 {
        let hardest = u8::try_from(depth.clamp(1, 50)).unwrap_or(50) + 5;
        Lock::Locked(rng.u8(1..=hardest))
    } else {
        Lock::Unlocked
    };
    let trap = (rng.u8(0..10) == 0).then(|| TrapKind::ALL[rng.usize(..TrapKind::ALL.len())]);
    let stuck = rng.u8(0..10) == 0;
    let open = lock == Lock::Unlocked && !stuck && rng.u8(0..4) == 0;
    EntityKind::Door {
        material,
        lock,
        trap,
        open,
        stuck,
        hitpoints: material.hitpoints(),
    }
}

fn roll_monster(depth: i32, rng: &mut fastrand::Rng) -> EntityKind {
    let native = MonsterRace::ALL
        .iter()
        .filter(|race| race.native_depth() <= depth)
        .count()
        .max(1);
    let race = MonsterRace::ALL[rng.usize(..native)];
    let bonus = u32::try_from((depth - race.native_depth()).max(0) / 3).unwrap_or(0);
    let level = 1 + bonus + rng.u32(0..=1);
    let hitpoints: u32 = (0..level).map(|_| rng.u32(1..=race.hit_die())).sum();
    let save = |base: i16| base + i16::try_from(level / 2).unwrap_or(i16::MAX);
    EntityKind::Monster {
        race,
        level,
        hitpoints,
        max_hitpoints: hitpoints,
        armor_class: race.armor_class(),
        saves: Saves {
            fortitude: save(2),
            reflex: save(1),
            will: save(0),
        },
        immunities: race.immunities(),
    }
}

fn roll_treasure(depth: i32, rng: &mut fastrand::Rng) -> EntityKind {
    let roll = rng.i32(0..100) + depth * 2;
    let kind = match roll {
        r if r >= 110 => TreasureKind::Gems,
        r if r >= 80 => TreasureKind::Gold,
        r if r >= 45 => TreasureKind::Silver,
        _ => TreasureKind::Copper,
    };
    let gold = kind.base_value() * rng.u32(1..=10) * (1 + depth.unsigned_abs() / 4);
    EntityKind::Treasure { kind, gold }
}
