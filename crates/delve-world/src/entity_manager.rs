//! Generation-checked entity storage.
//!
//! Entities live in per-archetype slot arrays. A freed slot keeps its
//! generation counter, bumped on every free, and its index goes on a LIFO
//! free list for the archetype. Ids carry the generation they were issued
//! with, so a handle kept past its entity's deletion never resolves to
//! whatever reuses the slot.

use delve_common::{Archetype, EntityError, EntityId, EntityResult, MAX_SLOT_INDEX};
use tracing::debug;

use crate::entity::Entity;

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Arena of live entities addressed by [`EntityId`].
#[derive(Debug)]
pub struct EntityManager {
    /// Slots indexed by archetype tag, then slot index
    slots: Vec<Vec<Slot>>,
    /// Free slot indices per archetype tag (LIFO)
    bins: Vec<Vec<u32>>,
    /// Live entity count
    live: usize,
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        let tags = usize::from(Archetype::MAX_TAG) + 1;
        Self {
            slots: (0..tags).map(|_| Vec::new()).collect(),
            bins: (0..tags).map(|_| Vec::new()).collect(),
            live: 0,
        }
    }

    /// Stores `entity` and returns its new id.
    ///
    /// The most recently freed slot of the archetype is reused first. The
    /// returned id is also written into the stored entity.
    pub fn insert(&mut self, mut entity: Entity) -> EntityResult<EntityId> {
        let archetype = entity.archetype();
        let tag = usize::from(archetype.tag());

        let index = match self.bins[tag].pop() {
            Some(index) => index,
            None => {
                let next = self.slots[tag].len();
                let index = u32::try_from(next)
                    .ok()
                    .filter(|&i| i <= MAX_SLOT_INDEX)
                    .ok_or(EntityError::SlotsExhausted(archetype))?;
                self.slots[tag].push(Slot::default());
                index
            }
        };

        let slot = &mut self.slots[tag][index as usize];
        let id = EntityId::new(archetype, index, slot.generation);
        entity.id = id;
        slot.entity = Some(entity);
        self.live += 1;
        Ok(id)
    }

    fn slot(&self, id: EntityId) -> Option<&Slot> {
        let (archetype, index) = id.decode()?;
        let slot = self
            .slots
            .get(usize::from(archetype.tag()))?
            .get(index as usize)?;
        (slot.generation == id.generation()).then_some(slot)
    }

    fn slot_mut(&mut self, id: EntityId) -> Option<&mut Slot> {
        let (archetype, index) = id.decode()?;
        let slot = self
            .slots
            .get_mut(usize::from(archetype.tag()))?
            .get_mut(index as usize)?;
        (slot.generation == id.generation()).then_some(slot)
    }

    /// Entity behind `id`, if it is still live.
    #[must_use]
    pub fn lookup(&self, id: EntityId) -> Option<&Entity> {
        self.slot(id)?.entity.as_ref()
    }

    /// Mutable entity behind `id`, if it is still live.
    pub fn lookup_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.slot_mut(id)?.entity.as_mut()
    }

    /// Whether `id` names a live entity.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.lookup(id).is_some()
    }

    /// Frees the slot behind `id` and returns its entity.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let slot = self.slot_mut(id)?;
        let entity = slot.entity.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.bins[usize::from(id.tag())].push(id.index());
        self.live -= 1;
        Some(entity)
    }

    /// Frees the slot behind `id` without handing back its state.
    pub fn delete(&mut self, id: EntityId) -> Option<EntityId> {
        self.remove(id).map(|entity| entity.id)
    }

    /// Number of live entities.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Whether no entity is live.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of live entities of one archetype.
    #[must_use]
    pub fn count_of(&self, archetype: Archetype) -> usize {
        self.all_of_type(archetype).count()
    }

    /// Live entities of one archetype, in slot order.
    pub fn all_of_type(&self, archetype: Archetype) -> impl Iterator<Item = &Entity> + '_ {
        self.slots[usize::from(archetype.tag())]
            .iter()
            .filter_map(|slot| slot.entity.as_ref())
    }

    /// Every live entity, grouped by archetype.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.slots
            .iter()
            .flatten()
            .filter_map(|slot| slot.entity.as_ref())
    }

    /// Slots ever allocated for one archetype, live or free.
    #[must_use]
    pub fn capacity_of(&self, archetype: Archetype) -> usize {
        self.slots[usize::from(archetype.tag())].len()
    }

    /// Frees every live entity.
    ///
    /// Generations are bumped as with [`remove`](Self::remove), so ids
    /// issued before the clear stay dead afterwards.
    pub fn clear(&mut self) {
        let freed = self.live;
        for (slots, bin) in self.slots.iter_mut().zip(self.bins.iter_mut()) {
            for (index, slot) in slots.iter_mut().enumerate() {
                if slot.entity.take().is_some() {
                    slot.generation = slot.generation.wrapping_add(1);
                    bin.push(index as u32);
                }
            }
        }
        self.live = 0;
        debug!("Cleared {} entities", freed);
    }
}
