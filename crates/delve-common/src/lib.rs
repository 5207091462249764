//! # Delve Common
//!
//! Common types shared by every Delve crate:
//! - Coordinate types (world, chunk, local)
//! - Archetype-tagged, generation-checked entity ids
//! - Version information for persisted records
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod ids;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::version::*;
}

pub use prelude::*;
