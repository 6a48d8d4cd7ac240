use super::ATTACK;
use crate::ability::{
    AbilityBehavior, AbilityDescriptor, AbilityInstance, AbilityKind, AbilityOutcome,
    AbilityParams, AbilityResult, ExecutionPhase, Legality,
};
use crate::sim::SimContext;
use crate::world::{Entity, EntityId, World};

const SIEGE_SETUP_TICKS: u32 = 2;
const SIEGE_RANGE: u32 = 3;
const SIEGE_BONUS_DAMAGE: u32 = 6;

fn target_in_range(ctx: &SimContext<'_>, performer: EntityId, target: EntityId, range: u32) -> bool {
    ctx.world
        .distance_between(performer, target)
        .is_some_and(|distance| distance <= range)
}

/// A single strike resolved through the damage ledger at the end of the tick.
pub struct AttackBehavior;

impl AbilityBehavior for AttackBehavior {
    fn descriptor(&self) -> AbilityDescriptor {
        AbilityDescriptor {
            kind: AbilityKind::Attack,
            phase: ExecutionPhase::Interaction,
            channels: ATTACK,
            cancelable: true,
        }
    }

    fn legality(&self, ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality {
        let Some(target) = ability.params.target() else {
            return Legality::IndefinitelyIllegal;
        };
        let Some(performer) = ctx.world.entity(ability.performer) else {
            return Legality::IndefinitelyIllegal;
        };
        if performer.data.attack_damage == 0
            || !ctx.world.is_alive(target)
            || !ctx.world.is_enemy(ability.performer, target)
        {
            return Legality::IndefinitelyIllegal;
        }
        if target_in_range(ctx, ability.performer, target, performer.data.attack_range) {
            Legality::Legal
        } else {
            Legality::NotYetLegal
        }
    }

    fn perform(&self, ctx: &mut SimContext<'_>, ability: &mut AbilityInstance) -> AbilityOutcome {
        let Some(target) = ability.params.target() else {
            return AbilityOutcome::failed();
        };
        ctx.ledger.record_attack(ability.performer, target, 0);
        AbilityOutcome::new(AbilityResult::CompletedWithEffect)
    }

    /// The last attacker when it is still in range, otherwise the nearest enemy.
    fn default_params(&self, world: &World, performer: EntityId) -> Option<AbilityParams> {
        let attacker = world.entity(performer)?;
        if attacker.data.attack_damage == 0 {
            return None;
        }
        let range = attacker.data.attack_range;
        let retaliation = attacker.last_attacker.filter(|last| {
            world.is_alive(*last)
                && world.is_enemy(performer, *last)
                && world
                    .distance_between(performer, *last)
                    .is_some_and(|distance| distance <= range)
        });
        retaliation
            .or_else(|| world.nearest_enemy_in_range(performer, range))
            .map(|entity| AbilityParams::Target { entity })
    }

    fn cooldown_ticks(&self, performer: &Entity) -> u32 {
        performer.data.attack_cooldown_ticks
    }
}

/// Sets up for a couple of ticks, then bombards an enemy structure until it falls.
pub struct SiegeBehavior;

impl AbilityBehavior for SiegeBehavior {
    fn descriptor(&self) -> AbilityDescriptor {
        AbilityDescriptor {
            kind: AbilityKind::Siege,
            phase: ExecutionPhase::Interaction,
            channels: ATTACK,
            cancelable: true,
        }
    }

    fn legality(&self, ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality {
        let Some(target) = ability.params.target() else {
            return Legality::IndefinitelyIllegal;
        };
        let Some(entity) = ctx.world.entity(target) else {
            // Gone after the bombardment started; `perform` completes it.
            return if ability.progress > 0 {
                Legality::Legal
            } else {
                Legality::IndefinitelyIllegal
            };
        };
        if !entity.data.is_structure || !ctx.world.is_enemy(ability.performer, target) {
            return Legality::IndefinitelyIllegal;
        }
        Legality::Legal
    }

    fn perform(&self, ctx: &mut SimContext<'_>, ability: &mut AbilityInstance) -> AbilityOutcome {
        let Some(target) = ability.params.target() else {
            return AbilityOutcome::failed();
        };
        if !ctx.world.is_alive(target) {
            return AbilityOutcome::new(AbilityResult::CompletedWithoutEffect);
        }
        if ability.progress < SIEGE_SETUP_TICKS {
            ability.progress += 1;
            return AbilityOutcome::new(AbilityResult::IncompleteWithoutEffect);
        }
        if !target_in_range(ctx, ability.performer, target, SIEGE_RANGE) {
            return AbilityOutcome::new(AbilityResult::IncompleteWithoutEffect);
        }
        ctx.ledger
            .record_attack(ability.performer, target, SIEGE_BONUS_DAMAGE);
        AbilityOutcome::new(AbilityResult::IncompleteWithEffect)
    }

    fn cooldown_ticks(&self, performer: &Entity) -> u32 {
        performer.data.attack_cooldown_ticks
    }
}
