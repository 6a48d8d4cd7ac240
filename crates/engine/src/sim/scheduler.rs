use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::{Notification, SimContext, SimError};
use crate::ability::{
    AbilityBehavior, AbilityId, AbilityInstance, AbilityOutcome, AbilityRequest, AbilityResult,
    AbilityState, CooldownTimer, ExecutionPhase, FollowUp, Legality, PHASE_ORDER,
};
use crate::command::mutation;
use crate::world::EntityId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub abilities_attempted: u32,
    pub attacks_resolved: u32,
    pub kills: u32,
    pub entities_removed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbilityList {
    InProgress,
    Queued,
}

/// Advances the world by one tick.
///
/// Order: cooldowns, the three phases over every entity in id order, one
/// ability-set notification per dirty entity, the damage ledger, removals
/// requested before this tick, and a single collection-changed notification.
pub fn run_tick(ctx: &mut SimContext<'_>) -> Result<TickReport, SimError> {
    ctx.world.tick = ctx.world.tick.saturating_add(1);
    let mut report = TickReport {
        tick: ctx.world.tick,
        ..TickReport::default()
    };

    advance_cooldowns(ctx);

    for phase in PHASE_ORDER {
        for entity in ctx.world.entity_ids() {
            run_entity_phase(ctx, entity, phase, &mut report)?;
        }
    }

    flush_dirty(ctx);

    let resolutions = ctx.ledger.flush(ctx.world, ctx.events);
    report.attacks_resolved = resolutions.len() as u32;
    report.kills = resolutions.iter().filter(|r| r.killed).count() as u32;

    report.entities_removed = process_removals(ctx);
    flush_collection_changed(ctx);
    ctx.events.finish_tick_rollover();

    debug!(
        tick = report.tick,
        attempted = report.abilities_attempted,
        attacks = report.attacks_resolved,
        removed = report.entities_removed,
        "tick_completed"
    );
    Ok(report)
}

/// Emits pending observer notifications outside of a tick.
pub(crate) fn flush_observers(ctx: &mut SimContext<'_>) {
    flush_dirty(ctx);
    flush_collection_changed(ctx);
}

fn flush_dirty(ctx: &mut SimContext<'_>) {
    for entity in ctx.world.take_dirty() {
        if ctx.world.entities.contains_key(&entity) {
            ctx.emit(Notification::AbilitySetChanged { entity });
        }
    }
}

fn flush_collection_changed(ctx: &mut SimContext<'_>) {
    if let Some(version) = ctx.world.spatial.take_collection_changed() {
        ctx.emit(Notification::CollectionChanged { version });
    }
}

fn advance_cooldowns(ctx: &mut SimContext<'_>) {
    let mut expired = Vec::new();
    for performer in ctx.world.entities.values_mut() {
        for timer in &mut performer.cooldowns {
            timer.remaining_ticks = timer.remaining_ticks.saturating_sub(1);
            if timer.remaining_ticks == 0 {
                expired.push((performer.id, timer.ability, timer.kind));
            }
        }
        performer.cooldowns.retain(|timer| timer.remaining_ticks > 0);
    }
    for (entity, ability, kind) in expired {
        ctx.emit(Notification::CooldownExpired {
            entity,
            ability,
            kind,
        });
    }
}

fn process_removals(ctx: &mut SimContext<'_>) -> u32 {
    let tick = ctx.world.tick;
    let due: Vec<EntityId> = ctx
        .world
        .entities
        .values()
        .filter(|entity| {
            entity
                .pending_removal
                .is_some_and(|pending| pending.requested_tick < tick)
        })
        .map(|entity| entity.id)
        .collect();
    for entity in &due {
        mutation::finalize_removal(ctx, *entity);
    }
    due.len() as u32
}

fn run_entity_phase(
    ctx: &mut SimContext<'_>,
    entity: EntityId,
    phase: ExecutionPhase,
    report: &mut TickReport,
) -> Result<(), SimError> {
    if !ctx.world.entities.contains_key(&entity) {
        return Ok(());
    }
    try_default_ability(ctx, entity, phase, report)?;

    // Shared by both lists so an instance moved between them runs once per
    // tick. Passes repeat while they still attempt something, which picks up
    // follow-ups promoted into the in-progress list by the queued drain.
    let mut seen = BTreeSet::new();
    loop {
        let attempted_before = seen.len();
        drain(ctx, entity, phase, AbilityList::InProgress, &mut seen, report)?;
        drain(ctx, entity, phase, AbilityList::Queued, &mut seen, report)?;
        if seen.len() == attempted_before {
            break;
        }
    }
    Ok(())
}

/// Re-reads the list every iteration so abilities added during the drain are
/// still picked up, while `seen` keeps a requeued instance from running twice.
fn drain(
    ctx: &mut SimContext<'_>,
    entity: EntityId,
    phase: ExecutionPhase,
    list: AbilityList,
    seen: &mut BTreeSet<AbilityId>,
    report: &mut TickReport,
) -> Result<(), SimError> {
    // Channel-blocked entries are passed over for this drain only; they were
    // not attempted and may still run once the channel frees up.
    let mut passed_over = BTreeSet::new();
    loop {
        let Some(performer) = ctx.world.entity(entity) else {
            break;
        };
        let ids = match list {
            AbilityList::InProgress => &performer.in_progress,
            AbilityList::Queued => &performer.queued,
        };
        if ids.is_empty() {
            break;
        }
        let next = ids.iter().copied().find(|id| {
            !seen.contains(id)
                && !passed_over.contains(id)
                && ctx
                    .world
                    .ability(*id)
                    .map_or(true, |ability| ability.phase == phase)
        });
        let Some(next) = next else {
            break;
        };
        if run_listed_ability(ctx, entity, next, list, report)? {
            seen.insert(next);
        } else {
            passed_over.insert(next);
        }
    }
    Ok(())
}

/// Returns whether the ability was attempted.
fn run_listed_ability(
    ctx: &mut SimContext<'_>,
    entity: EntityId,
    id: AbilityId,
    list: AbilityList,
    report: &mut TickReport,
) -> Result<bool, SimError> {
    let Some(channels) = ctx.world.ability(id).map(|ability| ability.channels) else {
        warn!(entity = entity.0, ability = id.0, "scheduler_stale_ability_id");
        if let Some(performer) = ctx.world.entity_mut(entity) {
            performer.in_progress.retain(|other| *other != id);
            performer.queued.retain(|other| *other != id);
        }
        return Ok(false);
    };

    let blocked = match list {
        AbilityList::InProgress => ctx.world.cooldown_blocks(entity, channels),
        AbilityList::Queued => {
            ctx.world.channels_busy(entity, channels, None)
                || waits_behind_earlier_queued(ctx, entity, id, channels)
        }
    };
    if blocked {
        return Ok(false);
    }

    let catalog = ctx.catalog;
    let Some(mut instance) = ctx.world.abilities.remove(&id) else {
        return Ok(false);
    };
    let behavior = match catalog.behavior(instance.kind) {
        Ok(behavior) => behavior,
        Err(err) => {
            ctx.world.abilities.insert(id, instance);
            return Err(err);
        }
    };

    let Some(outcome) = attempt(ctx, behavior, &mut instance) else {
        ctx.world.abilities.insert(id, instance);
        return Ok(true);
    };
    report.abilities_attempted = report.abilities_attempted.saturating_add(1);

    match outcome.result {
        AbilityResult::CompletedWithEffect
        | AbilityResult::CompletedWithoutEffect
        | AbilityResult::Failed => {
            instance.state = match outcome.result {
                AbilityResult::CompletedWithEffect => AbilityState::CompletedWithEffect,
                AbilityResult::CompletedWithoutEffect => AbilityState::CompletedWithoutEffect,
                _ => AbilityState::Failed,
            };
            notify_result(ctx, &instance, outcome.result);
            if let Some(performer) = ctx.world.entity_mut(entity) {
                performer.in_progress.retain(|other| *other != id);
                performer.queued.retain(|other| *other != id);
            }
            ctx.world.mark_dirty(entity);
            apply_follow_up(ctx, &mut instance, outcome.follow_up)?;
            try_start_queued_followup(ctx, entity, &instance);
        }
        AbilityResult::IncompleteWithEffect | AbilityResult::IncompleteWithoutEffect => {
            notify_result(ctx, &instance, outcome.result);
            instance.state = AbilityState::InProgress;
            if list == AbilityList::Queued {
                if let Some(performer) = ctx.world.entity_mut(entity) {
                    performer.queued.retain(|other| *other != id);
                    performer.in_progress.push(id);
                }
                ctx.world.mark_dirty(entity);
            }
            ctx.world.abilities.insert(id, instance);
        }
    }
    Ok(true)
}

fn waits_behind_earlier_queued(
    ctx: &SimContext<'_>,
    entity: EntityId,
    id: AbilityId,
    channels: &[crate::ability::Channel],
) -> bool {
    let Some(performer) = ctx.world.entity(entity) else {
        return false;
    };
    performer
        .queued
        .iter()
        .take_while(|other| **other != id)
        .filter_map(|other| ctx.world.ability(*other))
        .any(|earlier| earlier.shares_channel(channels))
}

/// The per-attempt algorithm. `None` means not legal yet: leave it where it is.
fn attempt(
    ctx: &mut SimContext<'_>,
    behavior: &dyn AbilityBehavior,
    instance: &mut AbilityInstance,
) -> Option<AbilityOutcome> {
    if !ctx.world.is_alive(instance.performer) {
        return Some(AbilityOutcome::failed());
    }
    match behavior.legality(ctx, instance) {
        Legality::Legal => {}
        Legality::NotYetLegal => return None,
        Legality::IndefinitelyIllegal => return Some(AbilityOutcome::failed()),
    }

    let outcome = behavior.perform(ctx, instance);
    let cooldown = outcome.cooldown_ticks.or_else(|| {
        outcome
            .result
            .had_effect()
            .then_some(instance.cooldown_ticks)
    });
    if let Some(ticks) = cooldown.filter(|ticks| *ticks > 0) {
        if let Some(performer) = ctx.world.entity_mut(instance.performer) {
            performer.cooldowns.push(CooldownTimer {
                ability: instance.id,
                kind: instance.kind,
                channels: instance.channels,
                remaining_ticks: ticks,
            });
        }
    }
    Some(outcome)
}

fn notify_result(ctx: &mut SimContext<'_>, instance: &AbilityInstance, result: AbilityResult) {
    if result.had_effect() {
        ctx.emit(Notification::AbilityPerformed {
            entity: instance.performer,
            ability: instance.id,
            kind: instance.kind,
        });
    } else if result == AbilityResult::Failed {
        debug!(
            entity = instance.performer.0,
            kind = instance.kind.name(),
            "ability_failed"
        );
        ctx.emit(Notification::AbilityFailed {
            entity: instance.performer,
            ability: instance.id,
            kind: instance.kind,
        });
    }
}

fn apply_follow_up(
    ctx: &mut SimContext<'_>,
    instance: &mut AbilityInstance,
    follow_up: Option<FollowUp>,
) -> Result<(), SimError> {
    match follow_up {
        None => {}
        Some(FollowUp::Requeue) => {
            let (Some(id), true) = (instance.id, ctx.world.is_alive(instance.performer)) else {
                return Ok(());
            };
            let mut requeued = instance.clone();
            requeued.state = AbilityState::Queued;
            requeued.progress = 0;
            ctx.world.abilities.insert(id, requeued);
            if let Some(performer) = ctx.world.entity_mut(instance.performer) {
                performer.queued.push(id);
            }
            ctx.world.mark_dirty(instance.performer);
        }
        Some(FollowUp::Spawn(request)) => {
            let mut request: AbilityRequest = request;
            request.id = Some(ctx.world.allocate_ability_id());
            mutation::queue_ability(ctx, request, false, true, false)?;
        }
    }
    Ok(())
}

/// After an ability retires, promote the first queued ability sharing its
/// channels if nothing still holds them.
fn try_start_queued_followup(ctx: &mut SimContext<'_>, entity: EntityId, finished: &AbilityInstance) {
    let Some(performer) = ctx.world.entity(entity) else {
        return;
    };
    let candidate = performer.queued.iter().copied().find_map(|id| {
        if Some(id) == finished.id {
            return None;
        }
        ctx.world
            .ability(id)
            .filter(|queued| queued.shares_channel(finished.channels))
            .map(|queued| (id, queued.channels))
    });
    let Some((candidate, channels)) = candidate else {
        return;
    };
    if ctx.world.channels_busy(entity, channels, None) {
        return;
    }
    if let Some(performer) = ctx.world.entity_mut(entity) {
        performer.queued.retain(|id| *id != candidate);
        performer.in_progress.push(candidate);
    }
    if let Some(instance) = ctx.world.abilities.get_mut(&candidate) {
        instance.state = AbilityState::InProgress;
    }
    ctx.world.mark_dirty(entity);
    debug!(entity = entity.0, ability = candidate.0, "ability_followup_started");
}

fn try_default_ability(
    ctx: &mut SimContext<'_>,
    entity: EntityId,
    phase: ExecutionPhase,
    report: &mut TickReport,
) -> Result<(), SimError> {
    let Some(performer) = ctx.world.entity(entity).filter(|p| p.is_alive()) else {
        return Ok(());
    };
    let Some(kind) = performer.data.default_ability else {
        return Ok(());
    };
    let catalog = ctx.catalog;
    let behavior = catalog.behavior(kind)?;
    let descriptor = behavior.descriptor();
    if descriptor.phase != phase {
        return Ok(());
    }
    let phase_busy = performer
        .in_progress
        .iter()
        .filter_map(|id| ctx.world.ability(*id))
        .any(|ability| ability.phase == phase);
    let channel_claimed = performer
        .queued
        .iter()
        .filter_map(|id| ctx.world.ability(*id))
        .any(|ability| ability.shares_channel(descriptor.channels));
    if phase_busy
        || channel_claimed
        || ctx.world.channels_busy(entity, descriptor.channels, None)
    {
        return Ok(());
    }
    let Some(params) = behavior.default_params(ctx.world, entity) else {
        return Ok(());
    };

    let request = AbilityRequest::new(entity, kind, params);
    let mut instance = catalog.instantiate(&request, performer)?;
    instance.state = AbilityState::InProgress;
    let Some(outcome) = attempt(ctx, behavior, &mut instance) else {
        return Ok(());
    };
    report.abilities_attempted = report.abilities_attempted.saturating_add(1);
    if outcome.result.had_effect() {
        ctx.emit(Notification::AbilityPerformed {
            entity,
            ability: None,
            kind,
        });
    }
    Ok(())
}
