//! Chunk diffs: the edits that separate a resident chunk from its baseline.
//!
//! A diff is keyed by [`ChunkKey`] and serialized as a compact text record
//! list. Tile diffs go to the key-value store in their wire form. Entity
//! diffs stay in memory as [`EntityDiff`] values; their wire form is only
//! for debugging and dumps.
//!
//! Wire forms (all coordinates lowercase hex):
//! - tile diff: `x,y:tile` records joined by `;`, tile in hex
//! - entity diff: `x,y:id` records joined by `;`, id in decimal
//!
//! Malformed records are skipped on decode so one corrupt entry does not
//! lose the rest of the chunk.

use std::fmt;
use std::str::FromStr;

use delve_common::{ChunkUv, EntityId, LocalPos, CHUNK_SIZE};
use thiserror::Error;
use tracing::warn;

use crate::tile::Tile;

/// Diff record parse errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiffError {
    /// Record is not `x,y:value`
    #[error("Malformed record: {0:?}")]
    Malformed(String),
    /// Local coordinate outside the chunk
    #[error("Local coordinate out of range: {0:?}")]
    OutOfRange(String),
    /// Byte that is not a tile
    #[error("Unknown tile value {0:#04x}")]
    UnknownTile(u8),
    /// Id that is not a number
    #[error("Invalid entity id: {0:?}")]
    InvalidId(String),
    /// Key is not `depth_u_v`
    #[error("Invalid chunk key: {0:?}")]
    InvalidKey(String),
}

/// Store key for one chunk of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    /// Dungeon depth
    pub depth: i32,
    /// Chunk coordinate
    pub uv: ChunkUv,
}

impl ChunkKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(depth: i32, uv: ChunkUv) -> Self {
        Self { depth, uv }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}_{:x}_{:x}", self.depth, self.uv.u, self.uv.v)
    }
}

impl FromStr for ChunkKey {
    type Err = DiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DiffError::InvalidKey(s.to_string());
        let mut parts = s.split('_').map(|p| {
            u32::from_str_radix(p, 16)
                .map(|v| v as i32)
                .map_err(|_| invalid())
        });
        let (Some(depth), Some(u), Some(v), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        Ok(Self::new(depth?, ChunkUv::new(u?, v?)))
    }
}

/// Splits `x,y:value` and parses the local coordinate.
fn split_record(record: &str) -> Result<(LocalPos, &str), DiffError> {
    let malformed = || DiffError::Malformed(record.to_string());
    let (coords, value) = record.split_once(':').ok_or_else(malformed)?;
    let (x, y) = coords.split_once(',').ok_or_else(malformed)?;
    let x = u8::from_str_radix(x, 16).map_err(|_| malformed())?;
    let y = u8::from_str_radix(y, 16).map_err(|_| malformed())?;
    if i32::from(x) >= CHUNK_SIZE || i32::from(y) >= CHUNK_SIZE {
        return Err(DiffError::OutOfRange(record.to_string()));
    }
    Ok((LocalPos::new(x, y), value))
}

fn decode_records<T>(
    encoded: &str,
    parse: impl Fn(&str) -> Result<(LocalPos, T), DiffError>,
) -> Vec<(LocalPos, T)> {
    encoded
        .split(';')
        .filter(|record| !record.is_empty())
        .filter_map(|record| match parse(record) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping diff record: {}", e);
                None
            }
        })
        .collect()
}

/// Tiles that differ from the baseline, in row-major order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileDiff {
    records: Vec<(LocalPos, Tile)>,
}

impl TileDiff {
    /// Creates an empty diff.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Appends a record.
    pub fn push(&mut self, local: LocalPos, tile: Tile) {
        self.records.push((local, tile));
    }

    /// Whether the diff has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Records in order.
    pub fn iter(&self) -> impl Iterator<Item = (LocalPos, Tile)> + '_ {
        self.records.iter().copied()
    }

    /// Wire form.
    #[must_use]
    pub fn encode(&self) -> String {
        self.records
            .iter()
            .map(|(l, t)| format!("{:x},{:x}:{:x}", l.x, l.y, t.to_u8()))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Parses the wire form, skipping malformed records.
    #[must_use]
    pub fn decode(encoded: &str) -> Self {
        Self {
            records: decode_records(encoded, Self::parse_record),
        }
    }

    fn parse_record(record: &str) -> Result<(LocalPos, Tile), DiffError> {
        let (local, value) = split_record(record)?;
        let byte =
            u8::from_str_radix(value, 16).map_err(|_| DiffError::Malformed(record.to_string()))?;
        let tile = Tile::from_u8(byte).ok_or(DiffError::UnknownTile(byte))?;
        Ok((local, tile))
    }
}

/// Entity ids found in a chunk at unload, stacks bottom to top.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDiff {
    records: Vec<(LocalPos, EntityId)>,
}

impl EntityDiff {
    /// Creates an empty diff.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Appends a record.
    pub fn push(&mut self, local: LocalPos, id: EntityId) {
        self.records.push((local, id));
    }

    /// Whether the diff has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Records in order.
    pub fn iter(&self) -> impl Iterator<Item = (LocalPos, EntityId)> + '_ {
        self.records.iter().copied()
    }

    /// Wire form.
    #[must_use]
    pub fn encode(&self) -> String {
        self.records
            .iter()
            .map(|(l, id)| format!("{:x},{:x}:{}", l.x, l.y, id))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Parses the wire form, skipping malformed records.
    #[must_use]
    pub fn decode(encoded: &str) -> Self {
        Self {
            records: decode_records(encoded, Self::parse_record),
        }
    }

    fn parse_record(record: &str) -> Result<(LocalPos, EntityId), DiffError> {
        let (local, value) = split_record(record)?;
        let id = value
            .parse::<EntityId>()
            .map_err(|_| DiffError::InvalidId(value.to_string()))?;
        Ok((local, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_common::Archetype;
    use proptest::prelude::*;

    #[test]
    fn test_key_format() {
        let key = ChunkKey::new(3, ChunkUv::new(10, 2));
        assert_eq!(key.to_string(), "3_a_2");
        let negative = ChunkKey::new(-1, ChunkUv::new(-2, 0));
        assert_eq!(negative.to_string(), "ffffffff_fffffffe_0");
        assert_eq!("ffffffff_fffffffe_0".parse(), Ok(negative));
        assert_eq!("3_a_2".parse(), Ok(key));
    }

    #[test]
    fn test_key_rejects_garbage() {
        assert!("3_a".parse::<ChunkKey>().is_err());
        assert!("3_a_2_1".parse::<ChunkKey>().is_err());
        assert!("3_z_2".parse::<ChunkKey>().is_err());
        assert!("".parse::<ChunkKey>().is_err());
    }

    #[test]
    fn test_tile_diff_wire_form() {
        let mut diff = TileDiff::new();
        diff.push(LocalPos::new(3, 5), Tile::Rubble);
        diff.push(LocalPos::new(15, 0), Tile::SeedTreasure);
        assert_eq!(diff.encode(), "3,5:4;f,0:87");
        assert_eq!(TileDiff::decode(&diff.encode()), diff);
    }

    #[test]
    fn test_tile_diff_skips_bad_records() {
        let diff = TileDiff::decode("3,5:4;;zz;1,1:ff;10,0:1;2,2:1;4,4");
        let records: Vec<_> = diff.iter().collect();
        assert_eq!(
            records,
            vec![(LocalPos::new(3, 5), Tile::Rubble), (LocalPos::new(2, 2), Tile::Floor)]
        );
    }

    #[test]
    fn test_empty_diff() {
        assert_eq!(TileDiff::new().encode(), "");
        assert!(TileDiff::decode("").is_empty());
        assert!(EntityDiff::decode("").is_empty());
    }

    #[test]
    fn test_entity_diff_wire_form() {
        let id = EntityId::new(Archetype::Monster, 7, 2);
        let mut diff = EntityDiff::new();
        diff.push(LocalPos::new(1, 2), id);
        diff.push(LocalPos::new(1, 2), EntityId::encode(Archetype::Treasure, 0));
        let encoded = diff.encode();
        assert_eq!(encoded, format!("1,2:{};1,2:{}", id.raw(), 8u64 << 24));
        assert_eq!(EntityDiff::decode(&encoded), diff);
        assert_eq!(EntityDiff::decode("1,2:abc;1,2:5").len(), 1);
    }

    fn tile_strategy() -> impl Strategy<Value = Tile> {
        any::<u8>().prop_filter_map("known tile", Tile::from_u8)
    }

    proptest! {
        #[test]
        fn test_tile_diff_decode_inverts_encode(
            records in prop::collection::vec((0u8..16, 0u8..16, tile_strategy()), 0..40)
        ) {
            let mut diff = TileDiff::new();
            for (x, y, tile) in records {
                diff.push(LocalPos::new(x, y), tile);
            }
            prop_assert_eq!(TileDiff::decode(&diff.encode()), diff);
        }

        #[test]
        fn test_key_parse_inverts_display(depth in any::<i32>(), u in any::<i32>(), v in any::<i32>()) {
            let key = ChunkKey::new(depth, ChunkUv::new(u, v));
            prop_assert_eq!(key.to_string().parse::<ChunkKey>(), Ok(key));
        }
    }
}
