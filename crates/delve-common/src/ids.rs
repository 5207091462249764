//! ID types for entities.
//!
//! An [`EntityId`] is a 64-bit handle:
//!
//! ```text
//! [ generation: 32 | archetype tag: 8 | slot index: 24 ]
//! ```
//!
//! The low 32 bits are the packed `(archetype, slot)` handle. The generation
//! is bumped every time a slot is freed, so a handle that outlives its entity
//! never resolves to whatever reuses the slot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of bits used for the slot index.
pub const INDEX_BITS: u32 = 24;

/// Mask selecting the slot index from a packed handle.
pub const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Largest slot index an id can address.
pub const MAX_SLOT_INDEX: u32 = INDEX_MASK;

/// Closed set of entity categories.
///
/// The discriminants are persisted inside entity ids and must never change.
/// Tag 0 is reserved so that no valid id packs to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Archetype {
    /// Doors (material, lock, trap, open/stuck state)
    Door = 1,
    /// Hostile creatures
    Monster = 2,
    /// The player character
    Player = 3,
    /// Portals to another depth
    Portal = 4,
    /// Up/down staircases
    Stairs = 5,
    /// Same-level teleporters
    Teleport = 6,
    /// Floor traps
    Trap = 7,
    /// Gold and loot lying on the floor
    Treasure = 8,
}

impl Archetype {
    /// Every archetype, in tag order.
    pub const ALL: [Self; 8] = [
        Self::Door,
        Self::Monster,
        Self::Player,
        Self::Portal,
        Self::Stairs,
        Self::Teleport,
        Self::Trap,
        Self::Treasure,
    ];

    /// Highest tag value in use.
    pub const MAX_TAG: u8 = 8;

    /// Returns the persisted tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Looks up an archetype by tag.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Door),
            2 => Some(Self::Monster),
            3 => Some(Self::Player),
            4 => Some(Self::Portal),
            5 => Some(Self::Stairs),
            6 => Some(Self::Teleport),
            7 => Some(Self::Trap),
            8 => Some(Self::Treasure),
            _ => None,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Door => "door",
            Self::Monster => "monster",
            Self::Player => "player",
            Self::Portal => "portal",
            Self::Stairs => "stairs",
            Self::Teleport => "teleport",
            Self::Trap => "trap",
            Self::Treasure => "treasure",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Generation-checked, archetype-tagged entity handle.
///
/// [`handle`](Self::handle) is the classic 32-bit packed id, with
/// `handle >> 24` the archetype tag and `handle & 0x00FF_FFFF` the slot.
/// The generation lives in the upper 32 bits of [`raw`](Self::raw), so
/// shift the handle, not the raw value, to read the tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// "No entity".
    pub const NULL: Self = Self(0);

    /// Builds an id from its parts.
    ///
    /// `index` is truncated to [`INDEX_BITS`] bits.
    #[must_use]
    pub const fn new(archetype: Archetype, index: u32, generation: u32) -> Self {
        let handle = ((archetype as u32) << INDEX_BITS) | (index & INDEX_MASK);
        Self(((generation as u64) << 32) | handle as u64)
    }

    /// Packs `(archetype, index)` with generation 0.
    #[must_use]
    pub const fn encode(archetype: Archetype, index: u32) -> Self {
        Self::new(archetype, index, 0)
    }

    /// Unpacks `(archetype, index)`; `None` for NULL or an unknown tag.
    #[must_use]
    pub const fn decode(self) -> Option<(Archetype, u32)> {
        match self.archetype() {
            Some(archetype) => Some((archetype, self.index())),
            None => None,
        }
    }

    /// Archetype tag, if it names a known archetype.
    #[must_use]
    pub const fn archetype(self) -> Option<Archetype> {
        Archetype::from_tag(self.tag())
    }

    /// Raw archetype tag (`handle >> 24`).
    #[must_use]
    pub const fn tag(self) -> u8 {
        (self.handle() >> INDEX_BITS) as u8
    }

    /// Slot index (`handle & 0x00FF_FFFF`).
    #[must_use]
    pub const fn index(self) -> u32 {
        self.handle() & INDEX_MASK
    }

    /// Slot generation.
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The packed 32-bit `(archetype, index)` handle.
    #[must_use]
    pub const fn handle(self) -> u32 {
        self.0 as u32
    }

    /// Creates an entity ID from a raw value (for deserialization).
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Checks if this is a valid (non-null) entity ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.archetype() {
            Some(archetype) => write!(
                f,
                "EntityId({archetype}#{}v{})",
                self.index(),
                self.generation()
            ),
            None => write!(f, "EntityId(raw {})", self.0),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_null_id() {
        assert!(!EntityId::NULL.is_valid());
        assert_eq!(EntityId::NULL.decode(), None);
        assert_eq!(EntityId::default(), EntityId::NULL);
    }

    #[test]
    fn test_encode_layout() {
        let id = EntityId::encode(Archetype::Monster, 5);
        assert_eq!(id.handle(), (2 << 24) | 5);
        assert_eq!(id.tag(), 2);
        assert_eq!(id.index(), 5);
        assert_eq!(id.generation(), 0);
        assert!(id.is_valid());
    }

    #[test]
    fn test_generation_does_not_disturb_handle() {
        let id = EntityId::new(Archetype::Door, 77, 9);
        assert_eq!(id.generation(), 9);
        assert_eq!(id.decode(), Some((Archetype::Door, 77)));
        assert_ne!(id, EntityId::encode(Archetype::Door, 77));
    }

    #[test]
    fn test_handle_carries_tag_not_raw() {
        let id = EntityId::new(Archetype::Trap, 3, 1);
        assert_eq!(id.handle() >> INDEX_BITS, u32::from(Archetype::Trap.tag()));
        assert_eq!(id.handle() & INDEX_MASK, 3);
        assert_eq!(id.raw() & u64::from(u32::MAX), u64::from(id.handle()));
        assert_ne!(id.raw() >> INDEX_BITS, u64::from(Archetype::Trap.tag()));
    }

    #[test]
    fn test_display_parse() {
        let id = EntityId::new(Archetype::Treasure, 1234, 3);
        let text = id.to_string();
        assert_eq!(text.parse::<EntityId>().ok(), Some(id));
        assert!("door".parse::<EntityId>().is_err());
    }

    #[test]
    fn test_archetype_tags_stable() {
        for archetype in Archetype::ALL {
            assert_eq!(Archetype::from_tag(archetype.tag()), Some(archetype));
        }
        assert_eq!(Archetype::from_tag(0), None);
        assert_eq!(Archetype::from_tag(Archetype::MAX_TAG + 1), None);
    }

    proptest! {
        #[test]
        fn prop_id_round_trip(tag in 1u8..=Archetype::MAX_TAG, index in 0u32..=MAX_SLOT_INDEX, generation in any::<u32>()) {
            let archetype = Archetype::from_tag(tag).expect("tag in range");
            prop_assert_eq!(EntityId::encode(archetype, index).decode(), Some((archetype, index)));
            let id = EntityId::new(archetype, index, generation);
            prop_assert_eq!(id.decode(), Some((archetype, index)));
            prop_assert_eq!(id.generation(), generation);
            prop_assert_eq!(EntityId::from_raw(id.raw()), id);
        }
    }
}
