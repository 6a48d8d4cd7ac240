use tracing::debug;

use super::SUPPORT;
use crate::ability::{
    AbilityBehavior, AbilityDescriptor, AbilityInstance, AbilityKind, AbilityOutcome,
    AbilityResult, ExecutionPhase, Legality,
};
use crate::command::mutation;
use crate::sim::SimContext;
use crate::world::Entity;

const HEAL_DURATION_TICKS: u32 = 5;
const PICKUP_RANGE: u32 = 1;

/// Heal-over-time on a friendly target within the healer's range.
pub struct HealBehavior;

impl AbilityBehavior for HealBehavior {
    fn descriptor(&self) -> AbilityDescriptor {
        AbilityDescriptor {
            kind: AbilityKind::Heal,
            phase: ExecutionPhase::Interaction,
            channels: SUPPORT,
            cancelable: true,
        }
    }

    fn legality(&self, ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality {
        let (Some(target_id), Some(healer)) = (
            ability.params.target(),
            ctx.world.entity(ability.performer),
        ) else {
            return Legality::IndefinitelyIllegal;
        };
        let Some(target) = ctx.world.entity(target_id).filter(|t| t.is_alive()) else {
            return Legality::IndefinitelyIllegal;
        };
        if healer.data.heal_power == 0 || target.team != healer.team {
            return Legality::IndefinitelyIllegal;
        }
        let in_range = ctx
            .world
            .distance_between(ability.performer, target_id)
            .is_some_and(|distance| distance <= healer.data.attack_range);
        if in_range {
            Legality::Legal
        } else {
            Legality::NotYetLegal
        }
    }

    fn perform(&self, ctx: &mut SimContext<'_>, ability: &mut AbilityInstance) -> AbilityOutcome {
        let Some(target_id) = ability.params.target() else {
            return AbilityOutcome::failed();
        };
        let power = ctx
            .world
            .entity(ability.performer)
            .map(|healer| healer.data.heal_power)
            .unwrap_or(0);
        let Some(target) = ctx.world.entity_mut(target_id) else {
            return AbilityOutcome::failed();
        };
        let missing = target.data.max_hit_points.saturating_sub(target.hit_points);
        let healed = power.min(missing);
        target.hit_points += healed;
        let topped_up = target.hit_points >= target.data.max_hit_points;
        ability.progress += 1;

        let finished = topped_up || ability.progress >= HEAL_DURATION_TICKS;
        match (finished, healed > 0) {
            (true, true) => AbilityOutcome::new(AbilityResult::CompletedWithEffect),
            (true, false) => AbilityOutcome::new(AbilityResult::CompletedWithoutEffect),
            (false, true) => AbilityOutcome::new(AbilityResult::IncompleteWithEffect),
            (false, false) => AbilityOutcome::new(AbilityResult::IncompleteWithoutEffect),
        }
    }

    fn cooldown_ticks(&self, _performer: &Entity) -> u32 {
        1
    }
}

/// Collects a neutral pickup next to the performer into its team's treasury.
pub struct PickupBehavior;

impl AbilityBehavior for PickupBehavior {
    fn descriptor(&self) -> AbilityDescriptor {
        AbilityDescriptor {
            kind: AbilityKind::Pickup,
            phase: ExecutionPhase::PostInteractionGridUpdate,
            channels: SUPPORT,
            cancelable: true,
        }
    }

    fn legality(&self, ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality {
        let Some(target) = ability.params.target() else {
            return Legality::IndefinitelyIllegal;
        };
        let collectable = ctx
            .world
            .entity(target)
            .is_some_and(|pickup| pickup.is_alive() && pickup.is_pickup());
        if !collectable {
            return Legality::IndefinitelyIllegal;
        }
        let adjacent = ctx
            .world
            .distance_between(ability.performer, target)
            .is_some_and(|distance| distance <= PICKUP_RANGE);
        if adjacent {
            Legality::Legal
        } else {
            Legality::NotYetLegal
        }
    }

    fn perform(&self, ctx: &mut SimContext<'_>, ability: &mut AbilityInstance) -> AbilityOutcome {
        let Some(target) = ability.params.target() else {
            return AbilityOutcome::failed();
        };
        let Some(team) = ctx.world.entity(ability.performer).map(|p| p.team) else {
            return AbilityOutcome::failed();
        };
        let Some(pickup) = ctx.world.entity_mut(target) else {
            return AbilityOutcome::failed();
        };
        let value = pickup.data.pickup_value;
        // Dead pickups can no longer be collected by anyone else this tick.
        pickup.hit_points = 0;
        ctx.world.treasury.deposit(team, value);
        mutation::unregister_entity(ctx, target, false);
        debug!(
            performer = ability.performer.0,
            pickup = target.0,
            value,
            "pickup_collected"
        );
        AbilityOutcome::new(AbilityResult::CompletedWithEffect)
    }

    fn cooldown_ticks(&self, _performer: &Entity) -> u32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{IntentOutcome, RejectReason};
    use crate::grid::HexCoord;
    use crate::test_support::{
        entity, perform, plains, request, spawn, started, target, ticks, BLUE, RED,
    };
    use crate::world::{EntityData, NEUTRAL_TEAM};

    #[test]
    fn heal_tops_up_a_friendly_unit_over_several_ticks() {
        let mut sim = plains(6, 6);
        let healer = spawn(&mut sim, EntityData::healer(), RED, HexCoord::new(0, 0));
        let patient = spawn(&mut sim, EntityData::soldier(), RED, HexCoord::new(2, 0));
        {
            let mut ctx = sim.context();
            ctx.world.entity_mut(patient).expect("patient").hit_points = 22;
        }
        let heal = started(perform(
            &mut sim,
            request(healer, AbilityKind::Heal, target(patient)),
        ));

        let mut hit_points = Vec::new();
        for _ in 0..3 {
            ticks(&mut sim, 1);
            hit_points.push(entity(&sim, patient).hit_points);
        }
        assert_eq!(hit_points, vec![25, 28, 30]);
        assert!(entity(&sim, healer).in_progress.is_empty());
        assert!(sim.world().ability(heal).is_none());
    }

    #[test]
    fn heal_refuses_enemies() {
        let mut sim = plains(6, 6);
        let healer = spawn(&mut sim, EntityData::healer(), RED, HexCoord::new(0, 0));
        let foe = spawn(&mut sim, EntityData::soldier(), BLUE, HexCoord::new(3, 0));
        let outcome = perform(&mut sim, request(healer, AbilityKind::Heal, target(foe)));
        assert!(matches!(
            outcome,
            IntentOutcome::AbilityRejected {
                reason: RejectReason::Illegal,
                ..
            }
        ));
    }

    #[test]
    fn pickup_pays_the_team_and_removes_the_pile() {
        let mut sim = plains(6, 6);
        let soldier = spawn(&mut sim, EntityData::soldier(), RED, HexCoord::new(0, 0));
        let pile = spawn(&mut sim, EntityData::gold_pile(15), NEUTRAL_TEAM, HexCoord::new(1, 0));
        started(perform(
            &mut sim,
            request(soldier, AbilityKind::Pickup, target(pile)),
        ));

        ticks(&mut sim, 1);
        assert_eq!(sim.world().treasury().gold(RED), 115);
        assert!(!sim.world().is_alive(pile));

        ticks(&mut sim, 1);
        assert!(sim.world().entity(pile).is_none());
        assert_eq!(sim.world().treasury().gold(RED), 115);
    }

    #[test]
    fn pickup_out_of_reach_can_wait() {
        let mut sim = plains(6, 6);
        let soldier = spawn(&mut sim, EntityData::soldier(), RED, HexCoord::new(0, 0));
        let pile = spawn(&mut sim, EntityData::gold_pile(15), NEUTRAL_TEAM, HexCoord::new(3, 0));
        let outcome = perform(
            &mut sim,
            request(soldier, AbilityKind::Pickup, target(pile)).waiting_until_legal(),
        );
        assert!(matches!(outcome, IntentOutcome::AbilityQueued { .. }));
        ticks(&mut sim, 1);
        assert_eq!(sim.world().treasury().gold(RED), 100);
        assert!(sim.world().is_alive(pile));
    }
}
