//! Error types for Delve.

use crate::ids::Archetype;
use thiserror::Error;

/// Top-level error type for Delve operations.
#[derive(Debug, Error)]
pub enum DelveError {
    /// World/chunk errors
    #[error("World error: {0}")]
    World(#[from] WorldError),

    /// Entity storage errors
    #[error("Entity error: {0}")]
    Entity(#[from] EntityError),

    /// Persistence backend errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// World and chunk pool errors.
#[derive(Debug, Error)]
pub enum WorldError {
    /// The chunk pool cannot cover the configured render window
    #[error("Chunk pool too small: radius needs {required} chunks, pool has {capacity}")]
    PoolTooSmall {
        /// Chunks needed for the render window
        required: usize,
        /// Configured pool size
        capacity: usize,
    },

    /// World dimensions must be positive
    #[error("Invalid world dimensions {width}x{height}")]
    InvalidDimensions {
        /// Width in tiles
        width: i32,
        /// Height in tiles
        height: i32,
    },

    /// World is too small for the requested generator
    #[error("World {width}x{height} too small for generator (minimum side {min})")]
    TooSmall {
        /// Width in tiles
        width: i32,
        /// Height in tiles
        height: i32,
        /// Smallest side length the generator supports
        min: i32,
    },
}

/// Entity storage errors.
#[derive(Debug, Error)]
pub enum EntityError {
    /// No slot index left for this archetype
    #[error("No free {0} slots left")]
    SlotsExhausted(Archetype),
}

/// Key-value store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid magic bytes or truncated record
    #[error("Invalid record format")]
    InvalidFormat,

    /// Schema version mismatch
    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version found
        actual: String,
    },

    /// Header serialization failed
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Payload decompression failed
    #[error("Compression failed: {0}")]
    Compression(String),

    /// Key contains characters the backend cannot store
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
}

/// Result type alias for Delve operations.
pub type DelveResult<T> = Result<T, DelveError>;

/// Result type alias for world operations.
pub type WorldResult<T> = Result<T, WorldError>;

/// Result type alias for entity storage operations.
pub type EntityResult<T> = Result<T, EntityError>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
