//! Terrain tiles.
//!
//! A [`Tile`] is one byte. Its collision and sight properties are pure
//! functions of the value. Values at or above [`ENTITY_SEED_THRESHOLD`] are
//! *entity seeds*: on chunk load they turn into the world's floor tile plus a
//! freshly generated entity of the matching archetype.

use delve_common::Archetype;
use serde::{Deserialize, Serialize};

/// First tile value that marks an entity seed.
pub const ENTITY_SEED_THRESHOLD: u8 = 0x80;

/// Terrain/background tile.
///
/// Discriminants are persisted in chunk diffs and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tile {
    /// Nothing; outside the map
    #[default]
    Void = 0x00,
    /// Walkable floor
    Floor = 0x01,
    /// Diggable granite
    Wall = 0x02,
    /// Indestructible boundary wall
    PermanentWall = 0x03,
    /// Loose rock, cleared by digging
    Rubble = 0x04,
    /// Deep water
    Water = 0x05,
    /// Copper ore vein
    CopperVein = 0x06,
    /// Silver ore vein
    SilverVein = 0x07,
    /// Gold ore vein
    GoldVein = 0x08,
    /// Mithril ore vein
    MithrilVein = 0x09,
    /// General store entrance
    ShopGeneral = 0x20,
    /// Armoury entrance
    ShopArmoury = 0x21,
    /// Weaponsmith entrance
    ShopWeaponsmith = 0x22,
    /// Temple entrance
    ShopTemple = 0x23,
    /// Alchemist entrance
    ShopAlchemist = 0x24,
    /// Magic shop entrance
    ShopMagic = 0x25,
    /// Black market entrance
    ShopBlackMarket = 0x26,
    /// Player home entrance
    ShopHome = 0x27,
    /// Spawns a door
    SeedDoor = 0x80,
    /// Spawns a monster
    SeedMonster = 0x81,
    /// Spawns a portal
    SeedPortal = 0x82,
    /// Spawns an up staircase
    SeedStairsUp = 0x83,
    /// Spawns a down staircase
    SeedStairsDown = 0x84,
    /// Spawns a teleporter
    SeedTeleport = 0x85,
    /// Spawns a trap
    SeedTrap = 0x86,
    /// Spawns treasure
    SeedTreasure = 0x87,
}

impl Tile {
    /// Shop entrances in town order.
    pub const SHOP_FRONTS: [Self; 8] = [
        Self::ShopGeneral,
        Self::ShopArmoury,
        Self::ShopWeaponsmith,
        Self::ShopTemple,
        Self::ShopAlchemist,
        Self::ShopMagic,
        Self::ShopBlackMarket,
        Self::ShopHome,
    ];

    /// Decodes a persisted tile value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::Void,
            0x01 => Self::Floor,
            0x02 => Self::Wall,
            0x03 => Self::PermanentWall,
            0x04 => Self::Rubble,
            0x05 => Self::Water,
            0x06 => Self::CopperVein,
            0x07 => Self::SilverVein,
            0x08 => Self::GoldVein,
            0x09 => Self::MithrilVein,
            0x20 => Self::ShopGeneral,
            0x21 => Self::ShopArmoury,
            0x22 => Self::ShopWeaponsmith,
            0x23 => Self::ShopTemple,
            0x24 => Self::ShopAlchemist,
            0x25 => Self::ShopMagic,
            0x26 => Self::ShopBlackMarket,
            0x27 => Self::ShopHome,
            0x80 => Self::SeedDoor,
            0x81 => Self::SeedMonster,
            0x82 => Self::SeedPortal,
            0x83 => Self::SeedStairsUp,
            0x84 => Self::SeedStairsDown,
            0x85 => Self::SeedTeleport,
            0x86 => Self::SeedTrap,
            0x87 => Self::SeedTreasure,
            _ => return None,
        })
    }

    /// Persisted byte value.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether movement into this tile is blocked.
    #[must_use]
    pub const fn collides(self) -> bool {
        matches!(
            self,
            Self::Void
                | Self::Wall
                | Self::PermanentWall
                | Self::Rubble
                | Self::Water
                | Self::CopperVein
                | Self::SilverVein
                | Self::GoldVein
                | Self::MithrilVein
        ) || self.is_shop_front()
    }

    /// Whether this tile stops line of sight.
    #[must_use]
    pub const fn blocks_sight(self) -> bool {
        self.collides() && !matches!(self, Self::Water)
    }

    /// Whether digging turns this tile into floor.
    #[must_use]
    pub const fn is_diggable(self) -> bool {
        matches!(
            self,
            Self::Wall
                | Self::Rubble
                | Self::CopperVein
                | Self::SilverVein
                | Self::GoldVein
                | Self::MithrilVein
        )
    }

    /// Whether this tile is a shop entrance.
    #[must_use]
    pub const fn is_shop_front(self) -> bool {
        let v = self as u8;
        v >= Self::ShopGeneral as u8 && v <= Self::ShopHome as u8
    }

    /// Whether this tile materializes an entity on chunk load.
    #[must_use]
    pub const fn is_entity_seed(self) -> bool {
        self as u8 >= ENTITY_SEED_THRESHOLD
    }

    /// Archetype spawned by a seed tile.
    #[must_use]
    pub const fn seed_archetype(self) -> Option<Archetype> {
        match self {
            Self::SeedDoor => Some(Archetype::Door),
            Self::SeedMonster => Some(Archetype::Monster),
            Self::SeedPortal => Some(Archetype::Portal),
            Self::SeedStairsUp | Self::SeedStairsDown => Some(Archetype::Stairs),
            Self::SeedTeleport => Some(Archetype::Teleport),
            Self::SeedTrap => Some(Archetype::Trap),
            Self::SeedTreasure => Some(Archetype::Treasure),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Tile {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(value)
    }
}

impl From<Tile> for u8 {
    fn from(tile: Tile) -> Self {
        tile.to_u8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_round_trip() {
        for value in 0..=u8::MAX {
            if let Some(tile) = Tile::from_u8(value) {
                assert_eq!(tile.to_u8(), value);
                assert_eq!(Tile::try_from(value), Ok(tile));
            } else {
                assert_eq!(Tile::try_from(value), Err(value));
            }
        }
    }

    #[test]
    fn test_tile_is_one_byte() {
        assert_eq!(std::mem::size_of::<Tile>(), 1);
    }

    #[test]
    fn test_collision_classes() {
        assert!(!Tile::Floor.collides());
        assert!(Tile::Wall.collides());
        assert!(Tile::GoldVein.collides());
        assert!(Tile::ShopTemple.collides());
        assert!(!Tile::SeedDoor.collides());
        assert!(Tile::Water.collides());
        assert!(!Tile::Water.blocks_sight());
        assert!(Tile::Wall.blocks_sight());
    }

    #[test]
    fn test_seed_classification() {
        for value in 0..=u8::MAX {
            if let Some(tile) = Tile::from_u8(value) {
                assert_eq!(tile.is_entity_seed(), tile.seed_archetype().is_some());
            }
        }
        assert_eq!(Tile::SeedStairsUp.seed_archetype(), Some(Archetype::Stairs));
        assert_eq!(Tile::Floor.seed_archetype(), None);
    }

    #[test]
    fn test_diggable() {
        assert!(Tile::Wall.is_diggable());
        assert!(Tile::MithrilVein.is_diggable());
        assert!(!Tile::PermanentWall.is_diggable());
        assert!(!Tile::ShopHome.is_diggable());
    }
}
