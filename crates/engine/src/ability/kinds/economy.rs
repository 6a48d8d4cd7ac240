use tracing::{debug, warn};

use super::{ECONOMY, PRODUCTION};
use crate::ability::{
    AbilityBehavior, AbilityDescriptor, AbilityInstance, AbilityKind, AbilityOutcome,
    AbilityParams, AbilityResult, ExecutionPhase, Legality,
};
use crate::command::{mutation, IntentOutcome};
use crate::grid::HexCoord;
use crate::sim::SimContext;
use crate::world::{Entity, EntityData};

/// First neighbor of the builder, in fixed neighbor order, the blueprint may occupy.
fn free_adjacent_cell(ctx: &SimContext<'_>, builder: &Entity, blueprint: &EntityData) -> Option<HexCoord> {
    let origin = builder.cell?;
    origin.neighbors().into_iter().find(|cell| {
        ctx.world
            .occupancy_block(
                ctx.terrain,
                ctx.config.max_stack_height,
                builder.team,
                blueprint,
                *cell,
                None,
            )
            .is_none()
    })
}

/// Pays the blueprint cost when admitted, builds for the blueprint's build
/// time, then places the result next to the builder.
pub struct BuildBehavior;

impl AbilityBehavior for BuildBehavior {
    fn descriptor(&self) -> AbilityDescriptor {
        AbilityDescriptor {
            kind: AbilityKind::Build,
            phase: ExecutionPhase::PostInteractionGridUpdate,
            channels: PRODUCTION,
            cancelable: true,
        }
    }

    fn legality(&self, ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality {
        let (Some(blueprint), Some(builder)) = (
            ability.params.blueprint(),
            ctx.world.entity(ability.performer),
        ) else {
            return Legality::IndefinitelyIllegal;
        };
        if builder.cell.is_none() {
            return Legality::IndefinitelyIllegal;
        }
        // Production may start while the exit is blocked; placement waits in `perform`.
        if ability.progress == 0 && free_adjacent_cell(ctx, builder, blueprint).is_none() {
            return Legality::NotYetLegal;
        }
        Legality::Legal
    }

    fn perform(&self, ctx: &mut SimContext<'_>, ability: &mut AbilityInstance) -> AbilityOutcome {
        let Some(blueprint) = ability.params.blueprint().cloned() else {
            return AbilityOutcome::failed();
        };
        if ability.progress < blueprint.build_ticks {
            ability.progress += 1;
            return AbilityOutcome::new(AbilityResult::IncompleteWithoutEffect);
        }

        let Some(builder) = ctx.world.entity(ability.performer) else {
            return AbilityOutcome::failed();
        };
        let team = builder.team;
        let Some(cell) = free_adjacent_cell(ctx, builder, &blueprint) else {
            return AbilityOutcome::new(AbilityResult::IncompleteWithoutEffect);
        };
        let entity = ctx.world.allocate_entity_id();
        match mutation::spawn_entity(
            ctx,
            entity,
            blueprint,
            cell,
            team,
            Some(ability.performer),
            true,
        ) {
            Ok(IntentOutcome::Spawned { .. }) => {
                // Consumed; nothing left to refund.
                ability.paid_cost = 0;
                debug!(builder = ability.performer.0, entity = entity.0, cell = %cell, "build_completed");
                AbilityOutcome::new(AbilityResult::CompletedWithEffect)
            }
            Ok(_) => AbilityOutcome::new(AbilityResult::IncompleteWithoutEffect),
            Err(err) => {
                warn!(builder = ability.performer.0, error = %err, "build_spawn_failed");
                AbilityOutcome::failed()
            }
        }
    }

    fn cost(&self, _performer: &Entity, params: &AbilityParams) -> u32 {
        params.blueprint().map(|data| data.gold_cost).unwrap_or(0)
    }

    fn cooldown_ticks(&self, _performer: &Entity) -> u32 {
        0
    }
}

/// Sets where units produced by this entity head after spawning.
pub struct RallyBehavior;

impl AbilityBehavior for RallyBehavior {
    fn descriptor(&self) -> AbilityDescriptor {
        AbilityDescriptor {
            kind: AbilityKind::Rally,
            phase: ExecutionPhase::PostInteractionGridUpdate,
            channels: PRODUCTION,
            cancelable: true,
        }
    }

    fn legality(&self, ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality {
        match ability.params.destination() {
            Some(cell) if ctx.terrain.contains(cell) => Legality::Legal,
            _ => Legality::IndefinitelyIllegal,
        }
    }

    fn perform(&self, ctx: &mut SimContext<'_>, ability: &mut AbilityInstance) -> AbilityOutcome {
        let target = ability.params.destination();
        let Some(performer) = ctx.world.entity_mut(ability.performer) else {
            return AbilityOutcome::failed();
        };
        performer.rally_target = target;
        AbilityOutcome::new(AbilityResult::CompletedWithEffect)
    }

    fn cooldown_ticks(&self, _performer: &Entity) -> u32 {
        0
    }
}

/// Pays `income_per_cycle` every income cooldown, forever.
pub struct IncomeBehavior;

impl AbilityBehavior for IncomeBehavior {
    fn descriptor(&self) -> AbilityDescriptor {
        AbilityDescriptor {
            kind: AbilityKind::Income,
            phase: ExecutionPhase::PostInteractionGridUpdate,
            channels: ECONOMY,
            cancelable: false,
        }
    }

    fn legality(&self, ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality {
        match ctx.world.entity(ability.performer) {
            Some(performer) if performer.data.income_per_cycle > 0 => Legality::Legal,
            _ => Legality::IndefinitelyIllegal,
        }
    }

    fn perform(&self, ctx: &mut SimContext<'_>, ability: &mut AbilityInstance) -> AbilityOutcome {
        let Some((team, amount)) = ctx
            .world
            .entity(ability.performer)
            .map(|performer| (performer.team, performer.data.income_per_cycle))
        else {
            return AbilityOutcome::failed();
        };
        ctx.world.treasury.deposit(team, amount);
        ability.progress = ability.progress.saturating_add(1);
        AbilityOutcome::new(AbilityResult::IncompleteWithEffect)
    }

    fn cooldown_ticks(&self, performer: &Entity) -> u32 {
        performer.data.income_cooldown_ticks
    }
}
