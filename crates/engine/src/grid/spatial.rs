use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::warn;

use super::HexCoord;
use crate::world::{EntityId, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOrderHint {
    Top,
    Bottom,
    /// Clamped to the current stack height.
    At(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpatialError {
    #[error("cannot place entity {entity:?} at {cell}: occupied by {occupant:?}")]
    CellOccupiedConflict {
        entity: EntityId,
        cell: HexCoord,
        occupant: EntityId,
    },
    #[error("entity {0:?} is not registered in the spatial index")]
    NotRegistered(EntityId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    cell: HexCoord,
    team: TeamId,
}

/// Cell -> ordered stack (bottom first) with a reverse entity -> cell lookup.
///
/// The index refuses only conflicts it can see on its own: registering an
/// entity twice, or stacking entities of different teams in one cell. Every
/// other occupancy rule is checked by the caller before mutating.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    stacks: BTreeMap<HexCoord, Vec<EntityId>>,
    placements: HashMap<EntityId, Placement>,
    pending_change: bool,
    version: u64,
}

impl SpatialIndex {
    pub fn register(
        &mut self,
        entity: EntityId,
        team: TeamId,
        cell: HexCoord,
        hint: StackOrderHint,
        ignore: Option<EntityId>,
    ) -> Result<(), SpatialError> {
        if self.placements.contains_key(&entity) {
            return Err(SpatialError::CellOccupiedConflict {
                entity,
                cell,
                occupant: entity,
            });
        }
        self.check_team_conflict(entity, team, cell, ignore)?;
        self.insert(entity, team, cell, hint);
        Ok(())
    }

    pub fn unregister(&mut self, entity: EntityId) -> Option<HexCoord> {
        let Some(placement) = self.placements.remove(&entity) else {
            warn!(entity = entity.0, "spatial_unregister_missing_entity");
            return None;
        };
        self.remove_from_stack(entity, placement.cell);
        self.pending_change = true;
        Some(placement.cell)
    }

    /// Atomic remove-then-insert; the entity lands on top of the destination stack.
    pub fn move_entity(
        &mut self,
        entity: EntityId,
        destination: HexCoord,
    ) -> Result<HexCoord, SpatialError> {
        let placement = self
            .placements
            .get(&entity)
            .copied()
            .ok_or(SpatialError::NotRegistered(entity))?;
        if placement.cell == destination {
            return Ok(destination);
        }
        self.check_team_conflict(entity, placement.team, destination, None)?;
        self.remove_from_stack(entity, placement.cell);
        self.placements.remove(&entity);
        self.insert(entity, placement.team, destination, StackOrderHint::Top);
        Ok(placement.cell)
    }

    pub fn entities_at(&self, cell: HexCoord) -> &[EntityId] {
        self.stacks.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn top_entity_at(&self, cell: HexCoord) -> Option<EntityId> {
        self.entities_at(cell).last().copied()
    }

    pub fn cell_of(&self, entity: EntityId) -> Option<HexCoord> {
        self.placements.get(&entity).map(|placement| placement.cell)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.placements.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// All registered entities in cell order, bottom of each stack first.
    pub fn all_entities(&self) -> Vec<EntityId> {
        self.stacks.values().flatten().copied().collect()
    }

    pub fn active_entities_for_team(&self, team: TeamId) -> Vec<EntityId> {
        self.stacks
            .values()
            .flatten()
            .copied()
            .filter(|entity| {
                self.placements
                    .get(entity)
                    .is_some_and(|placement| placement.team == team)
            })
            .collect()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Coalesces every structural mutation since the last call into at most
    /// one change. Returns the new version when something changed.
    pub fn take_collection_changed(&mut self) -> Option<u64> {
        if !self.pending_change {
            return None;
        }
        self.pending_change = false;
        self.version = self.version.saturating_add(1);
        Some(self.version)
    }

    fn check_team_conflict(
        &self,
        entity: EntityId,
        team: TeamId,
        cell: HexCoord,
        ignore: Option<EntityId>,
    ) -> Result<(), SpatialError> {
        let conflict = self.entities_at(cell).iter().copied().find(|occupant| {
            *occupant != entity
                && Some(*occupant) != ignore
                && self
                    .placements
                    .get(occupant)
                    .is_some_and(|placement| placement.team != team)
        });
        match conflict {
            Some(occupant) => Err(SpatialError::CellOccupiedConflict {
                entity,
                cell,
                occupant,
            }),
            None => Ok(()),
        }
    }

    fn insert(&mut self, entity: EntityId, team: TeamId, cell: HexCoord, hint: StackOrderHint) {
        let stack = self.stacks.entry(cell).or_default();
        match hint {
            StackOrderHint::Top => stack.push(entity),
            StackOrderHint::Bottom => stack.insert(0, entity),
            StackOrderHint::At(index) => stack.insert(index.min(stack.len()), entity),
        }
        self.placements.insert(entity, Placement { cell, team });
        self.pending_change = true;
    }

    fn remove_from_stack(&mut self, entity: EntityId, cell: HexCoord) {
        if let Some(stack) = self.stacks.get_mut(&cell) {
            stack.retain(|occupant| *occupant != entity);
            if stack.is_empty() {
                self.stacks.remove(&cell);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: TeamId = TeamId(1);
    const BLUE: TeamId = TeamId(2);

    fn assert_lookups_agree(index: &SpatialIndex) {
        let mut seen = std::collections::HashSet::new();
        for (cell, stack) in &index.stacks {
            for entity in stack {
                assert!(seen.insert(*entity), "{entity:?} appears twice");
                assert_eq!(index.cell_of(*entity), Some(*cell));
            }
        }
        assert_eq!(seen.len(), index.len());
    }

    #[test]
    fn register_keeps_insertion_order_with_first_at_bottom() {
        let mut index = SpatialIndex::default();
        let cell = HexCoord::new(1, 1);
        index
            .register(EntityId(1), RED, cell, StackOrderHint::Top, None)
            .expect("first");
        index
            .register(EntityId(2), RED, cell, StackOrderHint::Top, None)
            .expect("second");
        index
            .register(EntityId(3), RED, cell, StackOrderHint::Bottom, None)
            .expect("third");

        assert_eq!(
            index.entities_at(cell),
            &[EntityId(3), EntityId(1), EntityId(2)]
        );
        assert_eq!(index.top_entity_at(cell), Some(EntityId(2)));
        assert_lookups_agree(&index);
    }

    #[test]
    fn duplicate_registration_is_a_conflict() {
        let mut index = SpatialIndex::default();
        index
            .register(EntityId(7), RED, HexCoord::new(0, 0), StackOrderHint::Top, None)
            .expect("first");
        let err = index
            .register(EntityId(7), RED, HexCoord::new(2, 2), StackOrderHint::Top, None)
            .expect_err("duplicate");
        assert!(matches!(err, SpatialError::CellOccupiedConflict { .. }));
        assert_eq!(index.cell_of(EntityId(7)), Some(HexCoord::new(0, 0)));
        assert_lookups_agree(&index);
    }

    #[test]
    fn enemy_stacking_is_refused_unless_ignored() {
        let mut index = SpatialIndex::default();
        let cell = HexCoord::new(0, 0);
        index
            .register(EntityId(1), RED, cell, StackOrderHint::Top, None)
            .expect("red");
        assert!(index
            .register(EntityId(2), BLUE, cell, StackOrderHint::Top, None)
            .is_err());
        index
            .register(EntityId(2), BLUE, cell, StackOrderHint::Top, Some(EntityId(1)))
            .expect("ignored occupant");
        assert_eq!(index.entities_at(cell).len(), 2);
    }

    #[test]
    fn move_is_atomic_and_lands_on_top() {
        let mut index = SpatialIndex::default();
        let from = HexCoord::new(0, 0);
        let to = HexCoord::new(1, 0);
        index
            .register(EntityId(1), RED, from, StackOrderHint::Top, None)
            .expect("mover");
        index
            .register(EntityId(2), RED, to, StackOrderHint::Top, None)
            .expect("friend");
        index
            .register(EntityId(3), BLUE, HexCoord::new(2, 0), StackOrderHint::Top, None)
            .expect("enemy");

        assert_eq!(index.move_entity(EntityId(1), to), Ok(from));
        assert!(index.entities_at(from).is_empty());
        assert_eq!(index.top_entity_at(to), Some(EntityId(1)));

        let err = index
            .move_entity(EntityId(1), HexCoord::new(2, 0))
            .expect_err("enemy cell");
        assert!(matches!(err, SpatialError::CellOccupiedConflict { .. }));
        assert_eq!(index.cell_of(EntityId(1)), Some(to));
        assert_eq!(
            index.move_entity(EntityId(99), to),
            Err(SpatialError::NotRegistered(EntityId(99)))
        );
        assert_lookups_agree(&index);
    }

    #[test]
    fn unregister_missing_entity_is_a_noop() {
        let mut index = SpatialIndex::default();
        assert_eq!(index.unregister(EntityId(5)), None);
        assert_eq!(index.take_collection_changed(), None);
    }

    #[test]
    fn structural_changes_coalesce_into_one_notification() {
        let mut index = SpatialIndex::default();
        let cell = HexCoord::new(0, 0);
        index
            .register(EntityId(1), RED, cell, StackOrderHint::Top, None)
            .expect("register");
        index.unregister(EntityId(1));
        index
            .register(EntityId(1), RED, cell, StackOrderHint::Top, None)
            .expect("re-register");

        assert_eq!(index.take_collection_changed(), Some(1));
        assert_eq!(index.take_collection_changed(), None);
        assert_eq!(index.version(), 1);
    }

    #[test]
    fn team_queries_filter_registered_entities() {
        let mut index = SpatialIndex::default();
        index
            .register(EntityId(1), RED, HexCoord::new(0, 0), StackOrderHint::Top, None)
            .expect("red 1");
        index
            .register(EntityId(2), BLUE, HexCoord::new(3, 0), StackOrderHint::Top, None)
            .expect("blue");
        index
            .register(EntityId(3), RED, HexCoord::new(0, 1), StackOrderHint::Top, None)
            .expect("red 2");

        assert_eq!(
            index.active_entities_for_team(RED),
            vec![EntityId(1), EntityId(3)]
        );
        assert_eq!(index.all_entities().len(), 3);
    }
}
