//! Expedition session: one player walking through streamed levels.
//!
//! [`Expedition`] bundles the current [`World`], the [`ChunkManager`] paging
//! it in, the [`EntityManager`] and the player's id, and exposes the handful
//! of actions a game loop drives.

use delve_common::{Archetype, DelveResult, EntityId, WorldPos};
use tracing::{debug, info};

use crate::entity::{Entity, EntityKind, StairDirection};
use crate::entity_manager::EntityManager;
use crate::store::{KeyValueStore, MemoryStore};
use crate::streaming::{ChunkManager, StreamingConfig};
use crate::tile::Tile;
use crate::world::World;

/// Default player name.
pub const PLAYER_NAME: &str = "Adventurer";

/// Result of a movement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The player stepped onto the target cell
    Moved,
    /// Terrain, an occupant or the level edge is in the way
    Blocked,
    /// The target cell is not resident
    Unloaded,
}

/// A running game over streamed levels.
#[derive(Debug)]
pub struct Expedition<S: KeyValueStore = MemoryStore> {
    world: World,
    chunks: ChunkManager<S>,
    entities: EntityManager,
    player: EntityId,
}

impl<S: KeyValueStore> Expedition<S> {
    /// Starts an expedition in the town.
    pub fn new(seed: u64, config: &StreamingConfig, store: S) -> DelveResult<Self> {
        Self::starting_at(seed, 0, config, store)
    }

    /// Starts an expedition at `depth`.
    pub fn starting_at(
        seed: u64,
        depth: i32,
        config: &StreamingConfig,
        store: S,
    ) -> DelveResult<Self> {
        let (world, spawn) = World::for_depth(seed, depth)?;
        let mut chunks = ChunkManager::with_store(config, store)?;
        let mut entities = EntityManager::new();
        let player = entities.insert(Entity::player(PLAYER_NAME, spawn))?;

        chunks.update(spawn, &world, &mut entities, true);
        chunks.set_id(spawn, player);
        info!(
            "Expedition started seed={} depth={} spawn={}",
            seed,
            world.depth(),
            spawn
        );

        Ok(Self {
            world,
            chunks,
            entities,
            player,
        })
    }

    /// Current level template.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Chunk manager.
    #[must_use]
    pub const fn chunks(&self) -> &ChunkManager<S> {
        &self.chunks
    }

    /// Mutable chunk manager.
    pub fn chunks_mut(&mut self) -> &mut ChunkManager<S> {
        &mut self.chunks
    }

    /// Entity storage.
    #[must_use]
    pub const fn entities(&self) -> &EntityManager {
        &self.entities
    }

    /// Mutable entity storage.
    pub fn entities_mut(&mut self) -> &mut EntityManager {
        &mut self.entities
    }

    /// Player id.
    #[must_use]
    pub const fn player(&self) -> EntityId {
        self.player
    }

    /// Current depth.
    #[must_use]
    pub const fn depth(&self) -> i32 {
        self.world.depth()
    }

    /// Where the player stands.
    #[must_use]
    pub fn player_position(&self) -> WorldPos {
        self.entities
            .lookup(self.player)
            .map_or(self.world.spawn(), |player| player.position)
    }

    /// Gold the player carries.
    #[must_use]
    pub fn player_gold(&self) -> u32 {
        self.entities
            .lookup(self.player)
            .and_then(Entity::gold)
            .unwrap_or(0)
    }

    /// Topmost entity of `archetype` in the stack at `pos`.
    fn find_in_stack(&self, pos: WorldPos, archetype: Archetype) -> Option<EntityId> {
        self.chunks
            .id_stack(pos)?
            .iter()
            .rev()
            .copied()
            .find(|id| id.archetype() == Some(archetype) && self.entities.contains(*id))
    }

    /// Steps the player by `(dx, dy)` and advances the chunk window.
    pub fn move_player(&mut self, dx: i32, dy: i32) -> MoveOutcome {
        let from = self.player_position();
        let to = from.offset(dx, dy);
        if !self.world.in_bounds(to) {
            return MoveOutcome::Blocked;
        }
        let Some(collides) = self.chunks.get_collision(to) else {
            return MoveOutcome::Unloaded;
        };
        let occupied = self
            .chunks
            .get_id(to)
            .and_then(|top| self.entities.lookup(top))
            .is_some_and(|occupant| occupant.collision);
        if collides || occupied {
            return MoveOutcome::Blocked;
        }

        self.chunks.remove_id(from, self.player);
        self.chunks.set_id(to, self.player);
        if let Some(player) = self.entities.lookup_mut(self.player) {
            player.position = to;
        }
        self.chunks.update(to, &self.world, &mut self.entities, false);
        MoveOutcome::Moved
    }

    /// Opens the door at `pos`.
    pub fn open_door(&mut self, pos: WorldPos) -> bool {
        let Some(id) = self.find_in_stack(pos, Archetype::Door) else {
            return false;
        };
        let opened = self.entities.lookup_mut(id).is_some_and(Entity::open);
        if opened {
            debug!("Opened door at {}", pos);
        }
        opened
    }

    /// Digs out the tile at `pos`, leaving floor.
    pub fn dig(&mut self, pos: WorldPos) -> bool {
        match self.chunks.get_tile(pos) {
            Some(tile) if tile.is_diggable() => {
                self.chunks.set_tile(pos, Tile::Floor);
                debug!("Dug {:?} at {}", tile, pos);
                true
            },
            _ => false,
        }
    }

    /// Picks up the treasure at `pos` and credits its gold to the player.
    pub fn pick_up(&mut self, pos: WorldPos) -> Option<u32> {
        let id = self.find_in_stack(pos, Archetype::Treasure)?;
        self.chunks.remove_id(pos, id);
        let amount = self.entities.remove(id)?.gold().unwrap_or(0);
        if let Some(Entity {
            kind: EntityKind::Player { gold, .. },
            ..
        }) = self.entities.lookup_mut(self.player)
        {
            *gold = gold.saturating_add(amount);
        }
        debug!("Picked up {} gold at {}", amount, pos);
        Some(amount)
    }

    /// Takes the staircase under the player, if any.
    ///
    /// Returns the new depth.
    pub fn take_stairs(&mut self) -> DelveResult<Option<i32>> {
        let here = self.player_position();
        let Some(id) = self.find_in_stack(here, Archetype::Stairs) else {
            return Ok(None);
        };
        let target = match self.entities.lookup(id).map(|stairs| &stairs.kind) {
            Some(EntityKind::Stairs {
                direction: StairDirection::Down,
            }) => self.depth() + 1,
            Some(EntityKind::Stairs {
                direction: StairDirection::Up,
            }) => (self.depth() - 1).max(0),
            _ => return Ok(None),
        };
        self.change_level(target)?;
        Ok(Some(target))
    }

    /// Leaves the current level for `depth`.
    ///
    /// Tile edits of the level being left are flushed to the store first.
    /// Every entity except the player is dropped and the player gets a
    /// fresh id on the new level.
    pub fn change_level(&mut self, depth: i32) -> DelveResult<()> {
        let (world, spawn) = World::for_depth(self.world.seed(), depth)?;

        let from = self.player_position();
        self.chunks.remove_id(from, self.player);
        let flushed = self.chunks.unload_all(&self.world);

        let mut player = self
            .entities
            .remove(self.player)
            .unwrap_or_else(|| Entity::player(PLAYER_NAME, spawn));
        self.entities.clear();
        player.position = spawn;
        self.player = self.entities.insert(player)?;

        self.world = world;
        self.chunks.reset(spawn, self.world.width(), self.world.height());
        self.chunks.update(spawn, &self.world, &mut self.entities, true);
        self.chunks.set_id(spawn, self.player);

        info!(
            "Entered depth {} at {} ({} chunks flushed)",
            self.world.depth(),
            spawn,
            flushed
        );
        Ok(())
    }
}
