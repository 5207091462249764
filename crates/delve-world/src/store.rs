//! Key-value persistence for chunk diffs.
//!
//! The chunk manager only needs `get`/`set`/`remove` on string keys, so the
//! backend is a trait. [`MemoryStore`] keeps everything in a map;
//! [`DirectoryStore`] writes one compressed record file per key.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use delve_common::{MagicBytes, SchemaVersion, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// File extension for diff records.
pub const RECORD_EXTENSION: &str = "dlvd";

/// Minimal persistent map the chunk manager writes diffs to.
pub trait KeyValueStore {
    /// Value stored under `key`, if any.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Drops `key`. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> StoreResult<()>;
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Header written in front of every record file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHeader {
    /// Magic bytes for format identification
    pub magic: [u8; 4],
    /// Schema version
    pub version: SchemaVersion,
}

impl StoreHeader {
    /// Header for records written by this build.
    #[must_use]
    pub const fn current() -> Self {
        Self {
            magic: MagicBytes::DIFF.0,
            version: SchemaVersion::DIFF_RECORD,
        }
    }

    /// Validates the header.
    pub fn validate(&self) -> StoreResult<()> {
        if self.magic != MagicBytes::DIFF.0 {
            return Err(StoreError::InvalidFormat);
        }
        if !SchemaVersion::DIFF_RECORD.can_read(&self.version) {
            return Err(StoreError::VersionMismatch {
                expected: SchemaVersion::DIFF_RECORD.to_string(),
                actual: self.version.to_string(),
            });
        }
        Ok(())
    }
}

/// Encodes a record: header length, bincode header, lz4 payload.
pub fn encode_record(value: &[u8]) -> StoreResult<Vec<u8>> {
    let header_bytes = bincode::serialize(&StoreHeader::current())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let header_len =
        u32::try_from(header_bytes.len()).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let compressed = lz4_flex::compress_prepend_size(value);

    let mut result = Vec::with_capacity(4 + header_bytes.len() + compressed.len());
    result.extend_from_slice(&header_len.to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&compressed);
    Ok(result)
}

/// Decodes a record written by [`encode_record`].
pub fn decode_record(bytes: &[u8]) -> StoreResult<Vec<u8>> {
    if bytes.len() < 4 {
        return Err(StoreError::InvalidFormat);
    }
    let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if bytes.len() < 4 + header_len {
        return Err(StoreError::InvalidFormat);
    }
    let (header_bytes, payload) = bytes[4..].split_at(header_len);

    let header: StoreHeader = bincode::deserialize(header_bytes)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    header.validate()?;

    lz4_flex::decompress_size_prepended(payload).map_err(|e| StoreError::Compression(e.to_string()))
}

/// Store keeping one record file per key under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!("Opened diff store at {}", root.display());
        Ok(Self { root })
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record file backing `key`.
    pub fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase() || b == b'_' || b == b'-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.{RECORD_EXTENSION}")))
    }
}

impl KeyValueStore for DirectoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => decode_record(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &[u8]) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let record = encode_record(value)?;

        // Write to a sibling temp file first, then rename into place.
        let temp = path.with_extension("tmp");
        fs::write(&temp, &record)?;
        fs::rename(&temp, &path)?;
        debug!("Wrote {} ({} bytes)", path.display(), record.len());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
