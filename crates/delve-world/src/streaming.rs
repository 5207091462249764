//! World streaming and chunk management.
//!
//! The [`ChunkManager`] keeps a fixed pool of [`Chunk`] buffers and binds them
//! to the UVs inside a square window around the player. Moving the window
//! evicts chunks that fell outside it, in the order they were loaded, before
//! loading the ones that came into range. Evicted chunks leave behind a tile
//! diff (persisted through the [`KeyValueStore`]) and an entity diff (kept in
//! memory), which are reapplied over the regenerated baseline on reload.

use ahash::AHashMap;
use delve_common::{ChunkUv, EntityId, LocalPos, WorldError, WorldPos, WorldResult, CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::chunk::Chunk;
use crate::diff::{ChunkKey, EntityDiff, TileDiff};
use crate::entity::spawn_from_seed;
use crate::entity_manager::EntityManager;
use crate::generation::chunk_seed;
use crate::store::{KeyValueStore, MemoryStore};
use crate::tile::Tile;
use crate::world::World;

/// Chunk load/unload refusals.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    /// The UV is already resident
    #[error("Chunk {0} is already loaded")]
    AlreadyLoaded(ChunkUv),
    /// The UV is not resident
    #[error("Chunk {0} is not loaded")]
    NotLoaded(ChunkUv),
    /// The UV lies outside the world
    #[error("Chunk {0} is outside the world")]
    OutOfBounds(ChunkUv),
    /// Every pooled chunk is bound
    #[error("Chunk pool exhausted loading {uv}: all {capacity} slots in use")]
    PoolExhausted {
        /// Chunk that could not be loaded
        uv: ChunkUv,
        /// Pool size
        capacity: usize,
    },
}

/// Result type for chunk operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Pool size needed to hold a full window of radius `render_distance`.
#[must_use]
pub const fn required_chunks(render_distance: u32) -> usize {
    let d = render_distance as usize;
    1 + 4 * d * (d + 1)
}

/// Chunk manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Chebyshev radius of the resident window, in chunks
    pub render_distance: u32,
    /// Pool size; defaults to exactly one window
    pub max_chunks: Option<usize>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            render_distance: 2,
            max_chunks: None,
        }
    }
}

impl StreamingConfig {
    /// Creates a config for radius `render_distance` with a minimal pool.
    #[must_use]
    pub const fn with_render_distance(render_distance: u32) -> Self {
        Self {
            render_distance,
            max_chunks: None,
        }
    }

    /// Pool size this config asks for.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.max_chunks
            .unwrap_or_else(|| required_chunks(self.render_distance))
    }
}

/// What one window move changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Chunks unloaded, in eviction order
    pub evicted: Vec<ChunkUv>,
    /// Chunks loaded, row-major over the window
    pub loaded: Vec<ChunkUv>,
}

/// Pages world chunks in and out of a fixed buffer pool.
#[derive(Debug)]
pub struct ChunkManager<S: KeyValueStore = MemoryStore> {
    /// Window radius in chunks
    render_distance: u32,
    /// Chunk pool
    chunks: Vec<Chunk>,
    /// Resident UV -> pool slot
    chunk_map: AHashMap<ChunkUv, usize>,
    /// Resident UVs in load order; eviction walks this front to back
    load_order: Vec<ChunkUv>,
    /// Free pool slots
    bin: Vec<usize>,
    /// Tile diffs of evicted chunks
    tile_diff_cache: AHashMap<ChunkKey, TileDiff>,
    /// Entity diffs of evicted chunks
    entity_diff_cache: AHashMap<ChunkKey, EntityDiff>,
    /// Tile diff persistence
    store: S,
    /// Chunk the player stands in
    player_uv: Option<ChunkUv>,
    /// World size in chunks
    world_chunks: (i32, i32),
    /// Depth of the anchored world
    depth: i32,
    /// Seed of the anchored world
    seed: u64,
}

impl ChunkManager<MemoryStore> {
    /// Creates a manager persisting tile diffs in memory.
    pub fn new(config: &StreamingConfig) -> WorldResult<Self> {
        Self::with_store(config, MemoryStore::new())
    }
}

impl<S: KeyValueStore> ChunkManager<S> {
    /// Creates a manager persisting tile diffs to `store`.
    ///
    /// Fails when the configured pool cannot hold a full window.
    pub fn with_store(config: &StreamingConfig, store: S) -> WorldResult<Self> {
        let required = required_chunks(config.render_distance);
        let capacity = config.pool_size();
        if capacity < required {
            return Err(WorldError::PoolTooSmall { required, capacity });
        }

        info!(
            "Creating chunk manager with render_distance={}, max_chunks={}",
            config.render_distance, capacity
        );

        Ok(Self {
            render_distance: config.render_distance,
            chunks: (0..capacity).map(|_| Chunk::new()).collect(),
            chunk_map: AHashMap::with_capacity(capacity),
            load_order: Vec::with_capacity(capacity),
            // Reversed so slots are handed out from 0 upwards.
            bin: (0..capacity).rev().collect(),
            tile_diff_cache: AHashMap::new(),
            entity_diff_cache: AHashMap::new(),
            store,
            player_uv: None,
            world_chunks: (0, 0),
            depth: 0,
            seed: 0,
        })
    }

    /// Window radius in chunks.
    #[must_use]
    pub const fn render_distance(&self) -> u32 {
        self.render_distance
    }

    /// Pool size.
    #[must_use]
    pub fn max_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Number of resident chunks.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.chunk_map.len()
    }

    /// Number of free pool slots.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.bin.len()
    }

    /// Resident UVs in load order.
    #[must_use]
    pub fn resident_uvs(&self) -> &[ChunkUv] {
        &self.load_order
    }

    /// Chunk the window is centred on, once anchored.
    #[must_use]
    pub const fn player_uv(&self) -> Option<ChunkUv> {
        self.player_uv
    }

    /// Diff persistence backend.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Resident chunk at `uv`.
    #[must_use]
    pub fn chunk(&self, uv: ChunkUv) -> Option<&Chunk> {
        self.chunk_map.get(&uv).map(|&index| &self.chunks[index])
    }

    /// Cached tile diff of an evicted chunk.
    #[must_use]
    pub fn cached_tile_diff(&self, key: ChunkKey) -> Option<&TileDiff> {
        self.tile_diff_cache.get(&key)
    }

    /// Cached entity diff of an evicted chunk.
    #[must_use]
    pub fn cached_entity_diff(&self, key: ChunkKey) -> Option<&EntityDiff> {
        self.entity_diff_cache.get(&key)
    }

    /// Whether `uv` is resident.
    #[must_use]
    pub fn loaded(&self, uv: ChunkUv) -> bool {
        self.chunk_map.contains_key(&uv)
    }

    /// Whether `uv` lies inside the anchored world.
    #[must_use]
    pub const fn in_bounds(&self, uv: ChunkUv) -> bool {
        uv.u >= 0 && uv.v >= 0 && uv.u < self.world_chunks.0 && uv.v < self.world_chunks.1
    }

    /// Whether `uv` is inside the window around the player.
    #[must_use]
    pub fn within_distance(&self, uv: ChunkUv) -> bool {
        self.player_uv
            .is_some_and(|player| player.chebyshev(uv) <= self.render_distance)
    }

    /// Checks the pool bookkeeping: every slot is either free or bound to
    /// exactly one resident UV.
    #[must_use]
    pub fn pool_is_consistent(&self) -> bool {
        if self.bin.len() + self.chunk_map.len() != self.chunks.len()
            || self.load_order.len() != self.chunk_map.len()
        {
            return false;
        }
        let mut seen = vec![false; self.chunks.len()];
        for &index in self.bin.iter().chain(self.chunk_map.values()) {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        let free_unbound = self.bin.iter().all(|&i| !self.chunks[i].is_bound());
        let resident_bound = self
            .load_order
            .iter()
            .all(|uv| self.chunk_map.get(uv).is_some_and(|&i| self.chunks[i].uv() == Some(*uv)));
        free_unbound && resident_bound
    }

    /// Tile diff for `key`: cache first, then the store.
    fn fetch_tile_diff(&mut self, key: ChunkKey) -> Option<TileDiff> {
        if let Some(diff) = self.tile_diff_cache.get(&key) {
            return Some(diff.clone());
        }
        match self.store.get(&key.to_string()) {
            Ok(Some(bytes)) => {
                let diff = TileDiff::decode(&String::from_utf8_lossy(&bytes));
                self.tile_diff_cache.insert(key, diff.clone());
                Some(diff)
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read tile diff {}: {}", key, e);
                None
            },
        }
    }

    /// Binds a free slot to `uv` and fills it from the world.
    ///
    /// Seed tiles turn into the world's floor tile. Their entities are
    /// generated only the first time a chunk is seen; afterwards the cached
    /// entity diff restores whatever was there at eviction. Diffs are
    /// applied last and always win over the template. Returns the slot.
    pub fn load_chunk(
        &mut self,
        uv: ChunkUv,
        world: &World,
        entities: &mut EntityManager,
    ) -> ChunkResult<usize> {
        if self.chunk_map.contains_key(&uv) {
            return Err(ChunkError::AlreadyLoaded(uv));
        }
        let (width, height) = (world.width_in_chunks(), world.height_in_chunks());
        if uv.u < 0 || uv.v < 0 || uv.u >= width || uv.v >= height {
            return Err(ChunkError::OutOfBounds(uv));
        }
        let Some(index) = self.bin.pop() else {
            error!(
                "Chunk pool exhausted loading {} ({} slots)",
                uv,
                self.chunks.len()
            );
            return Err(ChunkError::PoolExhausted {
                uv,
                capacity: self.chunks.len(),
            });
        };

        self.chunk_map.insert(uv, index);
        self.load_order.push(uv);

        let key = ChunkKey::new(world.depth(), uv);
        let tile_diff = self.fetch_tile_diff(key);
        let entity_diff = self.entity_diff_cache.get(&key);
        let visited = entity_diff.is_some();

        let mut rng = fastrand::Rng::with_seed(chunk_seed(world.seed(), world.depth(), uv));
        let bounds = (world.width(), world.height());
        let chunk = &mut self.chunks[index];
        chunk.bind(uv);

        let mut spawned = 0usize;
        for local in LocalPos::all() {
            let pos = uv.local_to_world(local);
            let tile = world.lookup(pos.x, pos.y);
            if !tile.is_entity_seed() {
                chunk.tiles_mut().set(local, tile);
                continue;
            }
            chunk.tiles_mut().set(local, world.floor_tile());
            if visited {
                continue;
            }
            let Some(entity) = spawn_from_seed(tile, pos, world.depth(), &mut rng, bounds) else {
                continue;
            };
            match entities.insert(entity) {
                Ok(id) => {
                    chunk.ids_mut().push(local, id);
                    spawned += 1;
                },
                Err(e) => warn!("Dropping seed entity at {}: {}", pos, e),
            }
        }

        if let Some(diff) = &tile_diff {
            for (local, tile) in diff.iter() {
                chunk.tiles_mut().set(local, tile);
            }
        }

        let mut stale = 0usize;
        if let Some(diff) = entity_diff {
            for (local, id) in diff.iter() {
                if entities.contains(id) {
                    chunk.ids_mut().push(local, id);
                } else {
                    stale += 1;
                }
            }
        }

        chunk.refresh_collision();

        debug!(
            "Loaded chunk {} into slot {} (spawned={}, tile_diff={}, stale_ids={})",
            uv,
            index,
            spawned,
            tile_diff.as_ref().map_or(0, TileDiff::len),
            stale
        );
        Ok(index)
    }

    /// Records the diffs of a resident chunk and returns its slot to the pool.
    ///
    /// The tile diff is written to the store (or removed from it when the
    /// chunk matches its baseline); the entity diff stays in memory. An
    /// empty entity diff is still recorded so seeds do not respawn.
    pub fn unload_chunk(&mut self, uv: ChunkUv, world: &World) -> ChunkResult<usize> {
        let Some(&index) = self.chunk_map.get(&uv) else {
            return Err(ChunkError::NotLoaded(uv));
        };
        let key = ChunkKey::new(world.depth(), uv);
        let chunk = &self.chunks[index];

        let mut tile_diff = TileDiff::new();
        for local in LocalPos::all() {
            let pos = uv.local_to_world(local);
            let tile = chunk.tiles().get(local);
            if tile != world.baseline(pos.x, pos.y) {
                tile_diff.push(local, tile);
            }
        }

        let mut entity_diff = EntityDiff::new();
        for (local, stack) in chunk.ids().iter() {
            for &id in stack {
                entity_diff.push(local, id);
            }
        }

        let name = key.to_string();
        let (tile_records, entity_records) = (tile_diff.len(), entity_diff.len());
        if tile_diff.is_empty() {
            self.tile_diff_cache.remove(&key);
            if let Err(e) = self.store.remove(&name) {
                warn!("Failed to remove tile diff {}: {}", name, e);
            }
        } else {
            if let Err(e) = self.store.set(&name, tile_diff.encode().as_bytes()) {
                warn!("Failed to persist tile diff {}: {}", name, e);
            }
            self.tile_diff_cache.insert(key, tile_diff);
        }
        self.entity_diff_cache.insert(key, entity_diff);

        self.chunks[index].release();
        self.chunk_map.remove(&uv);
        self.load_order.retain(|&resident| resident != uv);
        self.bin.push(index);

        debug!(
            "Unloaded chunk {} from slot {} (tile_diff={}, entity_diff={})",
            uv, index, tile_records, entity_records
        );
        Ok(index)
    }

    /// Unloads every resident chunk in load order, recording their diffs.
    ///
    /// Returns the number of chunks unloaded.
    pub fn unload_all(&mut self, world: &World) -> usize {
        let resident = self.load_order.clone();
        resident
            .into_iter()
            .filter(|&uv| self.unload_chunk(uv, world).is_ok())
            .count()
    }

    /// Returns every resident slot to the pool without recording diffs.
    fn release_all(&mut self) {
        for uv in std::mem::take(&mut self.load_order) {
            if let Some(index) = self.chunk_map.remove(&uv) {
                self.chunks[index].release();
                self.bin.push(index);
            }
        }
    }

    /// Moves the window to the chunk containing `player_pos`.
    ///
    /// Returns `None` when neither the player's chunk nor the world changed
    /// and `force` is false. Otherwise every resident chunk outside the new
    /// window is unloaded first, then every missing in-bounds chunk inside
    /// it is loaded.
    pub fn update(
        &mut self,
        player_pos: WorldPos,
        world: &World,
        entities: &mut EntityManager,
        force: bool,
    ) -> Option<UpdateSummary> {
        let uv = player_pos.to_chunk_uv();
        let world_chunks = (world.width_in_chunks(), world.height_in_chunks());
        let same_level = self.depth == world.depth() && self.seed == world.seed();
        let unchanged =
            self.player_uv == Some(uv) && self.world_chunks == world_chunks && same_level;
        if unchanged && !force {
            return None;
        }

        if !same_level && !self.load_order.is_empty() {
            warn!(
                "Level changed without reset; dropping {} resident chunks",
                self.load_order.len()
            );
            self.release_all();
        }
        if self.player_uv != Some(uv) {
            debug!("Player moved to chunk {:?} -> {}", self.player_uv, uv);
        }
        self.player_uv = Some(uv);
        self.world_chunks = world_chunks;
        self.depth = world.depth();
        self.seed = world.seed();

        let mut summary = UpdateSummary::default();

        let far: Vec<ChunkUv> = self
            .load_order
            .iter()
            .copied()
            .filter(|&resident| !self.within_distance(resident))
            .collect();
        for resident in far {
            if self.unload_chunk(resident, world).is_ok() {
                summary.evicted.push(resident);
            }
        }

        let d = self.render_distance as i32;
        for v in uv.v - d..=uv.v + d {
            for u in uv.u - d..=uv.u + d {
                let target = ChunkUv::new(u, v);
                if self.loaded(target) || !self.in_bounds(target) {
                    continue;
                }
                match self.load_chunk(target, world, entities) {
                    Ok(_) => summary.loaded.push(target),
                    Err(e) => warn!("Skipping chunk {}: {}", target, e),
                }
            }
        }

        debug!(
            "Window at {}: evicted={}, loaded={}, resident={}",
            uv,
            summary.evicted.len(),
            summary.loaded.len(),
            self.chunk_map.len()
        );
        Some(summary)
    }

    /// Drops all residency and both diff caches, then re-anchors on
    /// `player_pos` in a `width`×`height` world.
    ///
    /// Persisted tile diffs stay in the store.
    pub fn reset(&mut self, player_pos: WorldPos, width: i32, height: i32) {
        let resident = self.load_order.len();
        self.tile_diff_cache.clear();
        self.entity_diff_cache.clear();
        self.release_all();
        self.player_uv = Some(player_pos.to_chunk_uv());
        self.world_chunks = (
            (width + CHUNK_SIZE - 1) / CHUNK_SIZE,
            (height + CHUNK_SIZE - 1) / CHUNK_SIZE,
        );
        info!(
            "Reset chunk manager at {} ({} chunks released)",
            player_pos, resident
        );
    }

    fn locate(&self, pos: WorldPos) -> Option<(usize, LocalPos)> {
        let index = *self.chunk_map.get(&pos.to_chunk_uv())?;
        Some((index, pos.to_local()))
    }

    fn locate_mut(&mut self, pos: WorldPos) -> Option<(&mut Chunk, LocalPos)> {
        let (index, local) = self.locate(pos)?;
        Some((&mut self.chunks[index], local))
    }

    /// Tile at `pos`.
    #[must_use]
    pub fn get_tile(&self, pos: WorldPos) -> Option<Tile> {
        let (index, local) = self.locate(pos)?;
        Some(self.chunks[index].tiles().get(local))
    }

    /// Collision bit at `pos`.
    #[must_use]
    pub fn get_collision(&self, pos: WorldPos) -> Option<bool> {
        let (index, local) = self.locate(pos)?;
        Some(self.chunks[index].collision().get(local))
    }

    /// Visibility bit at `pos`.
    #[must_use]
    pub fn get_visibility(&self, pos: WorldPos) -> Option<bool> {
        let (index, local) = self.locate(pos)?;
        Some(self.chunks[index].visibility().get(local))
    }

    /// Top occupant at `pos`; [`EntityId::NULL`] for an empty cell.
    #[must_use]
    pub fn get_id(&self, pos: WorldPos) -> Option<EntityId> {
        let (index, local) = self.locate(pos)?;
        Some(self.chunks[index].ids().top(local).unwrap_or(EntityId::NULL))
    }

    /// Occupant stack at `pos`, bottom first.
    #[must_use]
    pub fn id_stack(&self, pos: WorldPos) -> Option<&[EntityId]> {
        let (index, local) = self.locate(pos)?;
        Some(self.chunks[index].ids().stack(local))
    }

    /// Writes the tile at `pos` and refreshes its collision bit.
    ///
    /// Returns the previous tile.
    pub fn set_tile(&mut self, pos: WorldPos, tile: Tile) -> Option<Tile> {
        let (chunk, local) = self.locate_mut(pos)?;
        let previous = chunk.tiles_mut().replace(local, tile);
        chunk.refresh_collision_at(local);
        Some(previous)
    }

    /// Writes the collision bit at `pos`; returns the previous value.
    pub fn set_collision(&mut self, pos: WorldPos, value: bool) -> Option<bool> {
        let (chunk, local) = self.locate_mut(pos)?;
        Some(chunk.collision_mut().assign(local, value))
    }

    /// Writes the visibility bit at `pos`; returns the previous value.
    pub fn set_visibility(&mut self, pos: WorldPos, value: bool) -> Option<bool> {
        let (chunk, local) = self.locate_mut(pos)?;
        Some(chunk.visibility_mut().assign(local, value))
    }

    /// Pushes `id` on top of the stack at `pos`.
    pub fn set_id(&mut self, pos: WorldPos, id: EntityId) -> Option<()> {
        let (chunk, local) = self.locate_mut(pos)?;
        chunk.ids_mut().push(local, id);
        Some(())
    }

    /// Replaces the top occupant at `pos`.
    ///
    /// Returns the previous top, [`EntityId::NULL`] if the cell was empty.
    pub fn replace_id(&mut self, pos: WorldPos, id: EntityId) -> Option<EntityId> {
        let (chunk, local) = self.locate_mut(pos)?;
        Some(chunk.ids_mut().replace_top(local, id).unwrap_or(EntityId::NULL))
    }

    /// Slides `id` in directly below the top occupant at `pos`.
    pub fn insert_id_below_top(&mut self, pos: WorldPos, id: EntityId) -> Option<()> {
        let (chunk, local) = self.locate_mut(pos)?;
        chunk.ids_mut().insert_below_top(local, id);
        Some(())
    }

    /// Removes the top occupant at `pos`.
    ///
    /// Returns it, [`EntityId::NULL`] if the cell was empty.
    pub fn pop_id(&mut self, pos: WorldPos) -> Option<EntityId> {
        let (chunk, local) = self.locate_mut(pos)?;
        Some(chunk.ids_mut().pop(local).unwrap_or(EntityId::NULL))
    }

    /// Removes `id` from anywhere in the stack at `pos`.
    ///
    /// Returns whether it was there.
    pub fn remove_id(&mut self, pos: WorldPos, id: EntityId) -> Option<bool> {
        let (chunk, local) = self.locate_mut(pos)?;
        Some(chunk.ids_mut().remove(local, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{TEST_MAP_SIZE, TOWN_SIZE};
    use delve_common::Archetype;
    use proptest::prelude::*;

    fn test_map() -> World {
        let mut world =
            World::new(42, 1, TEST_MAP_SIZE, TEST_MAP_SIZE, Tile::Wall).expect("valid world");
        world.generate_test_map();
        world
    }

    fn town() -> (World, WorldPos) {
        let mut world =
            World::new(1337, 0, TOWN_SIZE, TOWN_SIZE, Tile::Floor).expect("valid world");
        let spawn = world.generate_town().expect("town fits");
        (world, spawn)
    }

    fn manager(radius: u32) -> ChunkManager {
        ChunkManager::new(&StreamingConfig::with_render_distance(radius)).expect("valid config")
    }

    #[test]
    fn test_required_chunks() {
        assert_eq!(required_chunks(0), 1);
        assert_eq!(required_chunks(1), 9);
        assert_eq!(required_chunks(2), 25);
        assert_eq!(required_chunks(3), 49);
    }

    #[test]
    fn test_rejects_small_pool() {
        let config = StreamingConfig {
            render_distance: 2,
            max_chunks: Some(10),
        };
        assert!(matches!(
            ChunkManager::new(&config),
            Err(WorldError::PoolTooSmall {
                required: 25,
                capacity: 10
            })
        ));
        let roomy = StreamingConfig {
            render_distance: 1,
            max_chunks: Some(12),
        };
        let manager = ChunkManager::new(&roomy).expect("valid config");
        assert_eq!(manager.max_chunks(), 12);
        assert_eq!(manager.free_count(), 12);
    }

    #[test]
    fn test_town_scenario() {
        let (world, spawn) = town();
        let mut entities = EntityManager::new();
        let mut chunks = manager(2);

        let summary = chunks
            .update(spawn, &world, &mut entities, true)
            .expect("forced update");
        assert_eq!(summary.loaded.len(), 25);
        assert!(summary.evicted.is_empty());
        assert_eq!(chunks.resident_count(), 25);
        assert_eq!(chunks.free_count(), 0);
        assert_eq!(chunks.get_tile(spawn), Some(Tile::Floor));
        assert_eq!(chunks.get_collision(spawn), Some(false));
        assert!(chunks.pool_is_consistent());
    }

    #[test]
    fn test_update_without_movement_is_noop() {
        let (world, spawn) = town();
        let mut entities = EntityManager::new();
        let mut chunks = manager(1);
        assert!(chunks.update(spawn, &world, &mut entities, false).is_some());
        assert!(chunks
            .update(spawn.offset(1, 0), &world, &mut entities, false)
            .is_none());
        let forced = chunks
            .update(spawn, &world, &mut entities, true)
            .expect("forced update");
        assert!(forced.loaded.is_empty());
        assert!(forced.evicted.is_empty());
    }

    #[test]
    fn test_window_coverage_after_move() {
        let (world, spawn) = town();
        let mut entities = EntityManager::new();
        let mut chunks = manager(1);
        chunks.update(spawn, &world, &mut entities, true);

        let moved = spawn.offset(CHUNK_SIZE, 0);
        let summary = chunks
            .update(moved, &world, &mut entities, false)
            .expect("moved one chunk");
        assert_eq!(summary.evicted.len(), 3);
        assert_eq!(summary.loaded.len(), 3);

        let centre = moved.to_chunk_uv();
        for v in centre.v - 1..=centre.v + 1 {
            for u in centre.u - 1..=centre.u + 1 {
                assert!(chunks.loaded(ChunkUv::new(u, v)));
            }
        }
        for uv in chunks.resident_uvs() {
            assert!(uv.chebyshev(centre) <= 1);
        }
        assert!(chunks.pool_is_consistent());
    }

    #[test]
    fn test_window_clipped_at_world_edge() {
        let world = test_map();
        let mut entities = EntityManager::new();
        let mut chunks = manager(1);
        let summary = chunks
            .update(WorldPos::new(1, 1), &world, &mut entities, true)
            .expect("forced update");
        assert_eq!(summary.loaded.len(), 4);
        assert!(!chunks.in_bounds(ChunkUv::new(-1, 0)));
        assert_eq!(chunks.get_tile(WorldPos::new(-1, 0)), None);
    }

    #[test]
    fn test_load_errors() {
        let world = test_map();
        let mut entities = EntityManager::new();
        let mut chunks = manager(0);

        assert_eq!(
            chunks.load_chunk(ChunkUv::new(4, 0), &world, &mut entities),
            Err(ChunkError::OutOfBounds(ChunkUv::new(4, 0)))
        );
        assert_eq!(chunks.load_chunk(ChunkUv::new(0, 0), &world, &mut entities), Ok(0));
        assert_eq!(
            chunks.load_chunk(ChunkUv::new(0, 0), &world, &mut entities),
            Err(ChunkError::AlreadyLoaded(ChunkUv::new(0, 0)))
        );
        assert_eq!(
            chunks.load_chunk(ChunkUv::new(1, 0), &world, &mut entities),
            Err(ChunkError::PoolExhausted {
                uv: ChunkUv::new(1, 0),
                capacity: 1
            })
        );
        assert_eq!(
            chunks.unload_chunk(ChunkUv::new(1, 1), &world),
            Err(ChunkError::NotLoaded(ChunkUv::new(1, 1)))
        );
        assert!(chunks.pool_is_consistent());
    }

    #[test]
    fn test_load_is_deterministic() {
        let world = test_map();
        let uv = ChunkUv::new(1, 0);

        let load = || {
            let mut entities = EntityManager::new();
            let mut chunks = manager(0);
            chunks.load_chunk(uv, &world, &mut entities).expect("load");
            let chunk = chunks.chunk(uv).expect("resident").clone();
            let spawned: Vec<_> = entities.iter().cloned().collect();
            (
                chunk.tiles().clone(),
                chunk.collision().clone(),
                chunk.ids().clone(),
                spawned,
            )
        };
        let first = load();
        assert_eq!(first, load());
        assert!(!first.3.is_empty());
    }

    #[test]
    fn test_seeds_become_floor_and_entities() {
        let world = test_map();
        let mut entities = EntityManager::new();
        let mut chunks = manager(0);
        chunks
            .load_chunk(ChunkUv::new(0, 0), &world, &mut entities)
            .expect("load");

        let door = WorldPos::new(14, 8);
        assert_eq!(chunks.get_tile(door), Some(Tile::Floor));
        let id = chunks.get_id(door).expect("resident");
        assert_eq!(id.archetype(), Some(Archetype::Door));
        let entity = entities.lookup(id).expect("door entity");
        assert_eq!(entity.position, door);
        assert_eq!(entities.count_of(Archetype::Door), 1);

        assert_eq!(chunks.get_collision(WorldPos::new(0, 0)), Some(true));
        assert_eq!(chunks.get_id(WorldPos::new(3, 3)), Some(EntityId::NULL));
    }

    #[test]
    fn test_unmutated_chunk_leaves_no_tile_diff() {
        let world = test_map();
        let mut entities = EntityManager::new();
        let mut chunks = manager(0);
        let uv = ChunkUv::new(0, 0);
        chunks.load_chunk(uv, &world, &mut entities).expect("load");
        let before = chunks.chunk(uv).expect("resident").tiles().clone();

        chunks.unload_chunk(uv, &world).expect("unload");
        let key = ChunkKey::new(1, uv);
        assert!(chunks.cached_tile_diff(key).is_none());
        assert!(chunks.store().is_empty());
        assert!(chunks.cached_entity_diff(key).is_some());

        chunks.load_chunk(uv, &world, &mut entities).expect("reload");
        assert_eq!(chunks.chunk(uv).expect("resident").tiles(), &before);
    }

    #[test]
    fn test_tile_diff_survives_reload() {
        let world = test_map();
        let mut entities = EntityManager::new();
        let mut chunks = manager(0);
        let uv = ChunkUv::new(0, 0);
        let target = uv.local_to_world(LocalPos::new(3, 5));

        chunks.load_chunk(uv, &world, &mut entities).expect("load");
        let baseline = chunks.chunk(uv).expect("resident").tiles().clone();
        assert_eq!(chunks.set_tile(target, Tile::Rubble), Some(Tile::Floor));
        assert_eq!(chunks.get_collision(target), Some(true));

        chunks.unload_chunk(uv, &world).expect("unload");
        let key = ChunkKey::new(1, uv);
        assert_eq!(
            chunks.store().get(&key.to_string()).expect("store read"),
            Some(b"3,5:4".to_vec())
        );

        chunks.load_chunk(uv, &world, &mut entities).expect("reload");
        assert_eq!(chunks.get_tile(target), Some(Tile::Rubble));
        assert_eq!(chunks.get_collision(target), Some(true));
        let reloaded = chunks.chunk(uv).expect("resident").tiles();
        for local in LocalPos::all() {
            if local != LocalPos::new(3, 5) {
                assert_eq!(reloaded.get(local), baseline.get(local));
            }
        }

        // Restoring the baseline drops the persisted diff.
        chunks.set_tile(target, Tile::Floor);
        chunks.unload_chunk(uv, &world).expect("unload");
        assert!(chunks.store().is_empty());
    }

    #[test]
    fn test_tile_diff_read_from_store() {
        let world = test_map();
        let mut store = MemoryStore::new();
        store.set("1_0_0", b"3,5:4;zz").expect("set");
        let mut chunks =
            ChunkManager::with_store(&StreamingConfig::with_render_distance(0), store)
                .expect("valid config");
        let mut entities = EntityManager::new();
        chunks
            .load_chunk(ChunkUv::new(0, 0), &world, &mut entities)
            .expect("load");
        assert_eq!(chunks.get_tile(WorldPos::new(3, 5)), Some(Tile::Rubble));
        assert_eq!(
            chunks.cached_tile_diff(ChunkKey::new(1, ChunkUv::new(0, 0))).map(TileDiff::len),
            Some(1)
        );
    }

    #[test]
    fn test_entities_persist_across_eviction() {
        let world = test_map();
        let mut entities = EntityManager::new();
        let mut chunks = manager(0);
        let uv = ChunkUv::new(1, 0);
        let monster = WorldPos::new(30, 6);

        chunks.load_chunk(uv, &world, &mut entities).expect("load");
        let monster_id = chunks.get_id(monster).expect("resident");
        assert_eq!(monster_id.archetype(), Some(Archetype::Monster));
        let spawned = entities.len();

        chunks.unload_chunk(uv, &world).expect("unload");
        chunks.load_chunk(uv, &world, &mut entities).expect("reload");
        assert_eq!(chunks.get_id(monster), Some(monster_id));
        assert_eq!(entities.len(), spawned);

        // Killed entities stay dead.
        let killed = chunks.pop_id(monster).expect("resident");
        entities.delete(killed);
        chunks.unload_chunk(uv, &world).expect("unload");
        chunks.load_chunk(uv, &world, &mut entities).expect("reload");
        assert_eq!(chunks.get_id(monster), Some(EntityId::NULL));
        assert_eq!(entities.len(), spawned - 1);
    }

    #[test]
    fn test_stale_ids_skipped_on_reload() {
        let world = test_map();
        let mut entities = EntityManager::new();
        let mut chunks = manager(0);
        let uv = ChunkUv::new(1, 0);
        let monster = WorldPos::new(30, 6);

        chunks.load_chunk(uv, &world, &mut entities).expect("load");
        let id = chunks.get_id(monster).expect("resident");
        chunks.unload_chunk(uv, &world).expect("unload");
        entities.delete(id);
        chunks.load_chunk(uv, &world, &mut entities).expect("reload");
        assert_eq!(chunks.id_stack(monster), Some(&[][..]));
    }

    #[test]
    fn test_id_stack_operations() {
        let world = test_map();
        let mut entities = EntityManager::new();
        let mut chunks = manager(0);
        chunks
            .load_chunk(ChunkUv::new(0, 0), &world, &mut entities)
            .expect("load");
        let pos = WorldPos::new(5, 5);
        let a = EntityId::encode(Archetype::Treasure, 1);
        let b = EntityId::encode(Archetype::Monster, 2);
        let c = EntityId::encode(Archetype::Player, 0);

        assert_eq!(chunks.set_id(pos, a), Some(()));
        assert_eq!(chunks.set_id(pos, b), Some(()));
        assert_eq!(chunks.insert_id_below_top(pos, c), Some(()));
        assert_eq!(chunks.id_stack(pos), Some(&[a, c, b][..]));
        assert_eq!(chunks.replace_id(pos, a), Some(b));
        assert_eq!(chunks.remove_id(pos, c), Some(true));
        assert_eq!(chunks.remove_id(pos, c), Some(false));
        assert_eq!(chunks.pop_id(pos), Some(a));
        assert_eq!(chunks.pop_id(pos), Some(a));
        assert_eq!(chunks.pop_id(pos), Some(EntityId::NULL));

        let outside = WorldPos::new(40, 40);
        assert_eq!(chunks.set_id(outside, a), None);
        assert_eq!(chunks.get_id(outside), None);
        assert_eq!(chunks.set_tile(outside, Tile::Floor), None);
    }

    #[test]
    fn test_flag_setters() {
        let world = test_map();
        let mut entities = EntityManager::new();
        let mut chunks = manager(0);
        chunks
            .load_chunk(ChunkUv::new(0, 0), &world, &mut entities)
            .expect("load");
        let pos = WorldPos::new(4, 4);
        assert_eq!(chunks.get_visibility(pos), Some(false));
        assert_eq!(chunks.set_visibility(pos, true), Some(false));
        assert_eq!(chunks.get_visibility(pos), Some(true));
        assert_eq!(chunks.set_collision(pos, true), Some(false));
        assert_eq!(chunks.get_collision(pos), Some(true));
    }

    #[test]
    fn test_reset_releases_everything() {
        let (world, spawn) = town();
        let mut entities = EntityManager::new();
        let mut chunks = manager(1);
        chunks.update(spawn, &world, &mut entities, true);
        chunks.set_tile(spawn, Tile::Rubble);
        chunks.update(spawn.offset(4 * CHUNK_SIZE, 0), &world, &mut entities, false);
        let key = ChunkKey::new(0, spawn.to_chunk_uv());
        assert!(chunks.cached_tile_diff(key).is_some());

        chunks.reset(spawn, world.width(), world.height());
        assert_eq!(chunks.resident_count(), 0);
        assert_eq!(chunks.free_count(), chunks.max_chunks());
        assert!(chunks.cached_tile_diff(key).is_none());
        assert!(chunks.cached_entity_diff(key).is_none());
        assert!(chunks.pool_is_consistent());

        // The persisted tile diff is picked up again.
        chunks.update(spawn, &world, &mut entities, true);
        assert_eq!(chunks.get_tile(spawn), Some(Tile::Rubble));
    }

    proptest! {
        #[test]
        fn test_pool_conserved_under_random_walk(
            steps in prop::collection::vec((-40i32..=40, -40i32..=40), 1..25),
            radius in 0u32..=2,
        ) {
            let (world, spawn) = town();
            let mut entities = EntityManager::new();
            let mut chunks = manager(radius);
            let mut pos = spawn;
            chunks.update(pos, &world, &mut entities, true);

            for (dx, dy) in steps {
                pos = WorldPos::new(
                    (pos.x + dx).clamp(0, world.width() - 1),
                    (pos.y + dy).clamp(0, world.height() - 1),
                );
                chunks.update(pos, &world, &mut entities, false);

                prop_assert!(chunks.pool_is_consistent());
                prop_assert_eq!(chunks.free_count() + chunks.resident_count(), chunks.max_chunks());
                let centre = pos.to_chunk_uv();
                for uv in chunks.resident_uvs() {
                    prop_assert!(uv.chebyshev(centre) <= radius);
                }
                prop_assert!(chunks.get_tile(pos).is_some());
            }
        }
    }
}
