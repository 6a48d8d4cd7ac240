use tracing::debug;

use super::{step_toward, Step, MOVEMENT};
use crate::ability::{
    AbilityBehavior, AbilityDescriptor, AbilityInstance, AbilityKind, AbilityOutcome,
    AbilityParams, AbilityRequest, AbilityResult, ExecutionPhase, FollowUp, Legality,
};
use crate::sim::SimContext;
use crate::world::{Entity, EntityId, World};

const CHARGE_MAX_CELLS: u32 = 3;
const CHARGE_BONUS_PER_CELL: u32 = 2;
const CHARGE_COOLDOWN_TICKS: u32 = 10;

fn movement_descriptor(kind: AbilityKind) -> AbilityDescriptor {
    AbilityDescriptor {
        kind,
        phase: ExecutionPhase::PreInteractionGridUpdate,
        channels: MOVEMENT,
        cancelable: true,
    }
}

fn destination_legality(ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality {
    let has_cell = ctx
        .world
        .entity(ability.performer)
        .is_some_and(|performer| performer.cell.is_some());
    match ability.params.destination() {
        Some(_) if has_cell => Legality::Legal,
        _ => Legality::IndefinitelyIllegal,
    }
}

/// One step toward the destination, then a cooldown scaled by the entry cost
/// of the cell it stepped onto.
fn advance(ctx: &mut SimContext<'_>, ability: &AbilityInstance) -> AbilityOutcome {
    let Some(destination) = ability.params.destination() else {
        return AbilityOutcome::failed();
    };
    let move_cooldown = ctx
        .world
        .entity(ability.performer)
        .map(|performer| performer.data.move_cooldown_ticks)
        .unwrap_or(1);
    match step_toward(ctx, ability.performer, destination) {
        Step::Arrived | Step::Stuck => {
            AbilityOutcome::new(AbilityResult::CompletedWithoutEffect)
        }
        Step::Waiting => AbilityOutcome::new(AbilityResult::IncompleteWithoutEffect),
        Step::Moved {
            entry_cost,
            final_step,
            ..
        } => {
            let result = if final_step {
                AbilityResult::CompletedWithEffect
            } else {
                AbilityResult::IncompleteWithEffect
            };
            AbilityOutcome::new(result).with_cooldown(move_cooldown.saturating_mul(entry_cost))
        }
        Step::Fault => AbilityOutcome::failed(),
    }
}

pub struct MoveBehavior;

impl AbilityBehavior for MoveBehavior {
    fn descriptor(&self) -> AbilityDescriptor {
        movement_descriptor(AbilityKind::Move)
    }

    fn legality(&self, ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality {
        destination_legality(ctx, ability)
    }

    fn perform(&self, ctx: &mut SimContext<'_>, ability: &mut AbilityInstance) -> AbilityOutcome {
        advance(ctx, ability)
    }

    fn cooldown_ticks(&self, performer: &Entity) -> u32 {
        performer.data.move_cooldown_ticks
    }
}

/// Moves like `Move` but holds while an enemy is within attack range, leaving
/// the strike itself to the attack channel.
pub struct AttackMoveBehavior;

impl AbilityBehavior for AttackMoveBehavior {
    fn descriptor(&self) -> AbilityDescriptor {
        movement_descriptor(AbilityKind::AttackMove)
    }

    fn legality(&self, ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality {
        destination_legality(ctx, ability)
    }

    fn perform(&self, ctx: &mut SimContext<'_>, ability: &mut AbilityInstance) -> AbilityOutcome {
        let range = ctx
            .world
            .entity(ability.performer)
            .map(|performer| performer.data.attack_range)
            .unwrap_or(0);
        if ctx
            .world
            .nearest_enemy_in_range(ability.performer, range)
            .is_some()
        {
            return AbilityOutcome::new(AbilityResult::IncompleteWithoutEffect);
        }
        advance(ctx, ability)
    }

    fn cooldown_ticks(&self, performer: &Entity) -> u32 {
        performer.data.move_cooldown_ticks
    }
}

pub struct ChargeBehavior;

impl AbilityBehavior for ChargeBehavior {
    fn descriptor(&self) -> AbilityDescriptor {
        movement_descriptor(AbilityKind::Charge)
    }

    fn legality(&self, ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality {
        let Some(target) = ability.params.target() else {
            return Legality::IndefinitelyIllegal;
        };
        if !ctx.world.is_alive(target) || !ctx.world.is_enemy(ability.performer, target) {
            return Legality::IndefinitelyIllegal;
        }
        let Some(performer) = ctx.world.entity(ability.performer) else {
            return Legality::IndefinitelyIllegal;
        };
        match ctx.world.distance_between(ability.performer, target) {
            Some(distance)
                if distance <= CHARGE_MAX_CELLS.saturating_add(performer.data.attack_range) =>
            {
                Legality::Legal
            }
            Some(_) => Legality::NotYetLegal,
            None => Legality::IndefinitelyIllegal,
        }
    }

    fn perform(&self, ctx: &mut SimContext<'_>, ability: &mut AbilityInstance) -> AbilityOutcome {
        let Some(target) = ability.params.target() else {
            return AbilityOutcome::failed();
        };
        let Some(range) = ctx
            .world
            .entity(ability.performer)
            .map(|performer| performer.data.attack_range)
        else {
            return AbilityOutcome::failed();
        };

        let mut dashed = 0u32;
        while dashed < CHARGE_MAX_CELLS {
            let in_range = ctx
                .world
                .distance_between(ability.performer, target)
                .is_some_and(|distance| distance <= range);
            if in_range {
                break;
            }
            let Some(target_cell) = ctx.world.entity(target).and_then(|entity| entity.cell) else {
                break;
            };
            match step_toward(ctx, ability.performer, target_cell) {
                Step::Moved { .. } => dashed += 1,
                Step::Fault => return AbilityOutcome::failed(),
                Step::Arrived | Step::Stuck | Step::Waiting => break,
            }
        }

        let in_range = ctx
            .world
            .distance_between(ability.performer, target)
            .is_some_and(|distance| distance <= range);
        if !in_range {
            let result = if dashed > 0 {
                AbilityResult::CompletedWithEffect
            } else {
                AbilityResult::CompletedWithoutEffect
            };
            return AbilityOutcome::new(result).with_cooldown(CHARGE_COOLDOWN_TICKS);
        }

        ctx.ledger.record_attack(
            ability.performer,
            target,
            dashed.saturating_mul(CHARGE_BONUS_PER_CELL),
        );
        debug!(
            performer = ability.performer.0,
            target = target.0,
            dashed,
            "charge_impact"
        );
        AbilityOutcome::new(AbilityResult::CompletedWithEffect)
            .with_cooldown(CHARGE_COOLDOWN_TICKS)
            .with_follow_up(FollowUp::Spawn(AbilityRequest::new(
                ability.performer,
                AbilityKind::Attack,
                AbilityParams::Target { entity: target },
            )))
    }

    fn cooldown_ticks(&self, _performer: &Entity) -> u32 {
        CHARGE_COOLDOWN_TICKS
    }
}

/// Occupies the movement channel until canceled.
pub struct HoldPositionBehavior;

impl AbilityBehavior for HoldPositionBehavior {
    fn descriptor(&self) -> AbilityDescriptor {
        movement_descriptor(AbilityKind::HoldPosition)
    }

    fn legality(&self, _ctx: &SimContext<'_>, _ability: &AbilityInstance) -> Legality {
        Legality::Legal
    }

    fn perform(&self, _ctx: &mut SimContext<'_>, _ability: &mut AbilityInstance) -> AbilityOutcome {
        AbilityOutcome::new(AbilityResult::IncompleteWithoutEffect)
    }

    fn cooldown_ticks(&self, _performer: &Entity) -> u32 {
        0
    }
}

/// Walks the performer's parade route. A queued parade requeues itself after
/// each lap so other queued orders get a turn.
pub struct ParadeBehavior;

impl AbilityBehavior for ParadeBehavior {
    fn descriptor(&self) -> AbilityDescriptor {
        movement_descriptor(AbilityKind::Parade)
    }

    fn legality(&self, ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality {
        match ctx.world.entity(ability.performer) {
            Some(performer) if !performer.data.parade_route.is_empty() => Legality::Legal,
            _ => Legality::IndefinitelyIllegal,
        }
    }

    fn perform(&self, ctx: &mut SimContext<'_>, ability: &mut AbilityInstance) -> AbilityOutcome {
        let Some((waypoint, route_len, move_cooldown)) =
            ctx.world.entity(ability.performer).and_then(|performer| {
                let route = &performer.data.parade_route;
                let waypoint = *route.get(performer.parade_cursor % route.len().max(1))?;
                Some((waypoint, route.len(), performer.data.move_cooldown_ticks))
            })
        else {
            return AbilityOutcome::failed();
        };

        let step = step_toward(ctx, ability.performer, waypoint);
        let (moved, reached_waypoint, cooldown) = match step {
            Step::Arrived => (false, true, 0),
            Step::Stuck => (false, true, 0),
            Step::Waiting => (false, false, 0),
            Step::Moved { to, entry_cost, .. } => (
                true,
                to == waypoint,
                move_cooldown.saturating_mul(entry_cost),
            ),
            Step::Fault => return AbilityOutcome::failed(),
        };

        let mut lap_complete = false;
        if reached_waypoint {
            if let Some(performer) = ctx.world.entity_mut(ability.performer) {
                performer.parade_cursor = (performer.parade_cursor + 1) % route_len;
                lap_complete = performer.parade_cursor == 0;
            }
        }

        let outcome = match (lap_complete, moved) {
            (true, true) => AbilityOutcome::new(AbilityResult::CompletedWithEffect)
                .with_follow_up(FollowUp::Requeue),
            (true, false) => AbilityOutcome::new(AbilityResult::CompletedWithoutEffect)
                .with_follow_up(FollowUp::Requeue),
            (false, true) => AbilityOutcome::new(AbilityResult::IncompleteWithEffect),
            (false, false) => AbilityOutcome::new(AbilityResult::IncompleteWithoutEffect),
        };
        if moved {
            outcome.with_cooldown(cooldown)
        } else {
            outcome
        }
    }

    fn default_params(&self, world: &World, performer: EntityId) -> Option<AbilityParams> {
        world
            .entity(performer)
            .filter(|entity| !entity.data.parade_route.is_empty())
            .map(|_| AbilityParams::None)
    }

    fn cooldown_ticks(&self, performer: &Entity) -> u32 {
        performer.data.move_cooldown_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{IntentOutcome, RejectReason};
    use crate::grid::HexCoord;
    use crate::test_support::{
        cancel, cell_of, destination, entity, perform, plains, queue, queued, request, spawn,
        started, target, ticks, BLUE, RED,
    };
    use crate::world::EntityData;

    #[test]
    fn charge_dashes_strikes_with_a_bonus_and_follows_up_with_an_attack() {
        let mut sim = plains(8, 4);
        let rider = spawn(&mut sim, EntityData::cavalry(), RED, HexCoord::new(0, 0));
        let foe = spawn(&mut sim, EntityData::soldier(), BLUE, HexCoord::new(3, 0));
        started(perform(
            &mut sim,
            request(rider, AbilityKind::Charge, target(foe)),
        ));

        ticks(&mut sim, 1);
        assert_eq!(cell_of(&sim, rider), Some(HexCoord::new(2, 0)));
        // Charge hit for 6 + 2 per cell dashed, then the follow-up attack for 6.
        assert_eq!(entity(&sim, foe).hit_points, 30 - 10 - 6);
        assert_eq!(entity(&sim, foe).last_attacker, Some(rider));
        // The foe's own default attack answered once.
        assert_eq!(entity(&sim, rider).hit_points, 40 - 5);

        let rider_state = entity(&sim, rider);
        assert!(rider_state.in_progress.is_empty());
        assert!(rider_state.queued.is_empty());
        assert!(rider_state
            .cooldowns
            .iter()
            .any(|timer| timer.kind == AbilityKind::Charge
                && timer.remaining_ticks == CHARGE_COOLDOWN_TICKS));
    }

    #[test]
    fn hold_position_keeps_the_movement_channel_until_canceled() {
        let mut sim = plains(6, 6);
        let soldier = spawn(&mut sim, EntityData::soldier(), RED, HexCoord::new(0, 0));
        let hold = started(perform(
            &mut sim,
            request(soldier, AbilityKind::HoldPosition, AbilityParams::None),
        ));
        let order = queued(queue(
            &mut sim,
            request(soldier, AbilityKind::Move, destination(3, 0)),
            false,
            false,
        ));

        ticks(&mut sim, 3);
        assert_eq!(cell_of(&sim, soldier), Some(HexCoord::new(0, 0)));
        assert_eq!(entity(&sim, soldier).in_progress, vec![hold]);
        assert_eq!(entity(&sim, soldier).queued, vec![order]);

        cancel(&mut sim, hold);
        ticks(&mut sim, 1);
        assert_eq!(cell_of(&sim, soldier), Some(HexCoord::new(1, 0)));
        assert_eq!(entity(&sim, soldier).in_progress, vec![order]);
    }

    #[test]
    fn queued_parade_requeues_behind_other_orders_after_each_lap() {
        let mut sim = plains(6, 6);
        let data = EntityData {
            move_cooldown_ticks: 1,
            parade_route: vec![HexCoord::new(1, 0), HexCoord::new(2, 0)],
            ..EntityData::soldier()
        };
        let soldier = spawn(&mut sim, data, RED, HexCoord::new(0, 0));
        let parade = queued(queue(
            &mut sim,
            request(soldier, AbilityKind::Parade, AbilityParams::None),
            false,
            false,
        ));
        let order = queued(queue(
            &mut sim,
            request(soldier, AbilityKind::Move, destination(0, 3)),
            false,
            false,
        ));

        ticks(&mut sim, 1);
        assert_eq!(cell_of(&sim, soldier), Some(HexCoord::new(1, 0)));
        assert_eq!(entity(&sim, soldier).in_progress, vec![parade]);
        assert_eq!(entity(&sim, soldier).queued, vec![order]);

        ticks(&mut sim, 1);
        assert_eq!(cell_of(&sim, soldier), Some(HexCoord::new(2, 0)));
        assert!(entity(&sim, soldier).in_progress.is_empty());
        assert_eq!(entity(&sim, soldier).queued, vec![order, parade]);
        assert_eq!(entity(&sim, soldier).parade_cursor, 0);

        ticks(&mut sim, 1);
        assert_ne!(cell_of(&sim, soldier), Some(HexCoord::new(2, 0)));
        assert_eq!(entity(&sim, soldier).in_progress, vec![order]);
        assert_eq!(entity(&sim, soldier).queued, vec![parade]);
    }

    #[test]
    fn move_without_a_destination_is_rejected() {
        let mut sim = plains(4, 4);
        let soldier = spawn(&mut sim, EntityData::soldier(), RED, HexCoord::new(0, 0));
        let outcome = perform(
            &mut sim,
            request(soldier, AbilityKind::Move, AbilityParams::None),
        );
        assert!(matches!(
            outcome,
            IntentOutcome::AbilityRejected {
                reason: RejectReason::Illegal,
                ..
            }
        ));
    }
}
