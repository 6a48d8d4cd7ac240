use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{Entity, EntityData, EntityId, TeamId, Treasury, NEUTRAL_TEAM};
use crate::ability::{AbilityId, AbilityInstance, Channel};
use crate::grid::{HexCoord, SpatialIndex, TerrainProvider};

/// Canceled ids remembered for "already canceled" reports. Oldest go first.
pub(crate) const CANCELED_HISTORY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockReason {
    OutOfBounds,
    Terrain,
    EnemyOccupied,
    StructureOccupied,
    StackFull,
}

/// Arena of entities and ability instances addressed by id.
///
/// Every cross reference (ability -> performer, timer -> ability, attack ->
/// target) is an id lookup here, so a removed entity is simply a miss.
#[derive(Debug)]
pub struct World {
    pub(crate) tick: u64,
    pub(crate) entities: BTreeMap<EntityId, Entity>,
    pub(crate) abilities: BTreeMap<AbilityId, AbilityInstance>,
    pub(crate) spatial: SpatialIndex,
    pub(crate) treasury: Treasury,
    pub(crate) dirty: BTreeSet<EntityId>,
    canceled: BTreeMap<AbilityId, EntityId>,
    next_entity_id: u64,
    next_ability_id: u64,
}

impl World {
    pub fn new(treasury: Treasury) -> Self {
        Self {
            tick: 0,
            entities: BTreeMap::new(),
            abilities: BTreeMap::new(),
            spatial: SpatialIndex::default(),
            treasury,
            dirty: BTreeSet::new(),
            canceled: BTreeMap::new(),
            next_entity_id: 1,
            next_ability_id: 1,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Ids in ascending order; the scheduler iterates this snapshot.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn ability(&self, id: AbilityId) -> Option<&AbilityInstance> {
        self.abilities.get(&id)
    }

    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    pub fn treasury(&self) -> &Treasury {
        &self.treasury
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.get(&id).is_some_and(Entity::is_alive)
    }

    pub fn was_canceled(&self, ability: AbilityId) -> bool {
        self.canceled.contains_key(&ability)
    }

    pub(crate) fn record_canceled(&mut self, ability: AbilityId, performer: EntityId) {
        self.canceled.insert(ability, performer);
        while self.canceled.len() > CANCELED_HISTORY {
            self.canceled.pop_first();
        }
    }

    /// Drops cancel history for an entity that no longer exists.
    pub(crate) fn forget_canceled_by(&mut self, performer: EntityId) {
        self.canceled.retain(|_, owner| *owner != performer);
    }

    #[cfg(test)]
    pub(crate) fn canceled_count(&self) -> usize {
        self.canceled.len()
    }

    pub(crate) fn allocate_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id = self.next_entity_id.saturating_add(1);
        EntityId(id)
    }

    pub(crate) fn allocate_ability_id(&mut self) -> AbilityId {
        let id = self.next_ability_id;
        self.next_ability_id = self.next_ability_id.saturating_add(1);
        AbilityId(id)
    }

    /// Keeps allocation in step with ids assigned elsewhere by the authority.
    pub(crate) fn observe_entity_id(&mut self, id: EntityId) {
        self.next_entity_id = self.next_entity_id.max(id.0.saturating_add(1));
    }

    pub(crate) fn observe_ability_id(&mut self, id: AbilityId) {
        self.next_ability_id = self.next_ability_id.max(id.0.saturating_add(1));
    }

    pub(crate) fn mark_dirty(&mut self, entity: EntityId) {
        self.dirty.insert(entity);
    }

    pub(crate) fn take_dirty(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    /// Occupancy rules checked before any placement touches the index.
    pub fn occupancy_block(
        &self,
        terrain: &dyn TerrainProvider,
        max_stack_height: usize,
        team: TeamId,
        data: &EntityData,
        cell: HexCoord,
        ignore: Option<EntityId>,
    ) -> Option<BlockReason> {
        if !terrain.contains(cell) {
            return Some(BlockReason::OutOfBounds);
        }
        if terrain.entry_cost(cell, data.movement).is_none() {
            return Some(BlockReason::Terrain);
        }

        let mut same_team = 0usize;
        for occupant in self.spatial.entities_at(cell) {
            if Some(*occupant) == ignore {
                continue;
            }
            let Some(occupant) = self.entities.get(occupant) else {
                continue;
            };
            if occupant.team != team {
                return Some(BlockReason::EnemyOccupied);
            }
            if data.is_structure && occupant.data.is_structure {
                return Some(BlockReason::StructureOccupied);
            }
            same_team += 1;
        }
        if same_team >= max_stack_height {
            return Some(BlockReason::StackFull);
        }
        None
    }

    /// Cells a mover of `team` may not path through.
    pub fn blocks_passage(&self, team: TeamId, cell: HexCoord) -> bool {
        self.spatial.entities_at(cell).iter().any(|occupant| {
            self.entities
                .get(occupant)
                .is_some_and(|occupant| occupant.team != team)
        })
    }

    pub fn is_enemy(&self, of: EntityId, other: EntityId) -> bool {
        match (self.entities.get(&of), self.entities.get(&other)) {
            (Some(a), Some(b)) => {
                a.team != b.team && a.team != NEUTRAL_TEAM && b.team != NEUTRAL_TEAM
            }
            _ => false,
        }
    }

    /// Nearest living enemy within `range`, taking the top of each stack and
    /// scanning cells in `cells_within` order.
    pub fn nearest_enemy_in_range(&self, entity: EntityId, range: u32) -> Option<EntityId> {
        let center = self.entities.get(&entity)?.cell?;
        center.cells_within(range).into_iter().find_map(|cell| {
            self.spatial
                .entities_at(cell)
                .iter()
                .rev()
                .copied()
                .find(|candidate| self.is_alive(*candidate) && self.is_enemy(entity, *candidate))
        })
    }

    pub fn distance_between(&self, a: EntityId, b: EntityId) -> Option<u32> {
        let from = self.entities.get(&a)?.cell?;
        let to = self.entities.get(&b)?.cell?;
        Some(from.distance(to))
    }

    /// True when a cooldown timer or another in-flight ability holds any of `channels`.
    pub(crate) fn channels_busy(
        &self,
        entity: EntityId,
        channels: &[Channel],
        except: Option<AbilityId>,
    ) -> bool {
        let Some(performer) = self.entities.get(&entity) else {
            return false;
        };
        let timer_busy = performer
            .cooldowns
            .iter()
            .any(|timer| timer.blocks_any(channels));
        if timer_busy {
            return true;
        }
        performer
            .in_progress
            .iter()
            .filter(|id| Some(**id) != except)
            .filter_map(|id| self.abilities.get(id))
            .any(|other| other.shares_channel(channels))
    }

    pub(crate) fn cooldown_blocks(&self, entity: EntityId, channels: &[Channel]) -> bool {
        self.entities.get(&entity).is_some_and(|performer| {
            performer
                .cooldowns
                .iter()
                .any(|timer| timer.blocks_any(channels))
        })
    }
}
