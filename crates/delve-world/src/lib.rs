//! # Delve World
//!
//! Level streaming and entity storage for Delve.
//!
//! This crate handles:
//! - Level templates and their procedural generators
//! - Pooled chunk loading/unloading around the player
//! - Tile and entity diffs, persisted through a key-value store
//! - Archetype-bucketed entity storage with generational ids

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod chunk;
pub mod diff;
pub mod entity;
pub mod entity_manager;
pub mod generation;
pub mod grid;
pub mod session;
pub mod store;
pub mod streaming;
pub mod tile;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::chunk::*;
    pub use crate::diff::*;
    pub use crate::entity::*;
    pub use crate::entity_manager::*;
    pub use crate::generation::*;
    pub use crate::grid::*;
    pub use crate::session::*;
    pub use crate::store::*;
    pub use crate::streaming::*;
    pub use crate::tile::*;
    pub use crate::world::*;
}

pub use prelude::*;
