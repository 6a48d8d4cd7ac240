//! World mutations shared by every authority backend.
//!
//! Local and remote authorities both end up here, so legality checks and
//! their outcomes are identical wherever an intent is applied.

use tracing::{debug, error, warn};

use super::{Intent, IntentOutcome, RejectReason};
use crate::ability::{
    AbilityId, AbilityKind, AbilityParams, AbilityRequest, AbilityState, CooldownTimer, Legality,
};
use crate::grid::{HexCoord, SpatialError, StackOrderHint};
use crate::sim::{Notification, SimContext, SimError};
use crate::world::{Entity, EntityData, EntityId, PendingRemoval, TeamId, World};

/// Fills in entity and ability ids. Only the authority calls this.
pub fn resolve_ids(world: &mut World, intent: Intent) -> Intent {
    match intent {
        Intent::SpawnEntity {
            entity: None,
            data,
            cell,
            team,
            spawner,
            movement_on_cooldown,
        } => Intent::SpawnEntity {
            entity: Some(world.allocate_entity_id()),
            data,
            cell,
            team,
            spawner,
            movement_on_cooldown,
        },
        Intent::PerformAbility {
            mut request,
            clear_queue_first,
            handle_cost,
            from_input,
        } => {
            if request.id.is_none() {
                request.id = Some(world.allocate_ability_id());
            }
            Intent::PerformAbility {
                request,
                clear_queue_first,
                handle_cost,
                from_input,
            }
        }
        Intent::QueueAbility {
            mut request,
            clear_queue_first,
            insert_at_front,
            handle_cost,
        } => {
            if request.id.is_none() {
                request.id = Some(world.allocate_ability_id());
            }
            Intent::QueueAbility {
                request,
                clear_queue_first,
                insert_at_front,
                handle_cost,
            }
        }
        other => other,
    }
}

pub fn apply_intent(ctx: &mut SimContext<'_>, intent: &Intent) -> Result<IntentOutcome, SimError> {
    if !intent.is_resolved() {
        error!(intent = intent.name(), "intent_unresolved");
        return Err(SimError::UnresolvedIntent);
    }
    match intent {
        Intent::SpawnEntity {
            entity,
            data,
            cell,
            team,
            spawner,
            movement_on_cooldown,
        } => {
            let entity = entity.ok_or(SimError::UnresolvedIntent)?;
            spawn_entity(
                ctx,
                entity,
                data.clone(),
                *cell,
                *team,
                *spawner,
                *movement_on_cooldown,
            )
        }
        Intent::MoveEntity {
            entity,
            destination,
        } => move_entity(ctx, *entity, *destination),
        Intent::PerformAbility {
            request,
            clear_queue_first,
            handle_cost,
            from_input,
        } => perform_ability(
            ctx,
            request.clone(),
            *clear_queue_first,
            *handle_cost,
            *from_input,
        ),
        Intent::QueueAbility {
            request,
            clear_queue_first,
            insert_at_front,
            handle_cost,
        } => queue_ability(
            ctx,
            request.clone(),
            *clear_queue_first,
            *insert_at_front,
            *handle_cost,
        ),
        Intent::CancelAbility { ability } => cancel_ability(ctx, *ability),
        Intent::UnregisterEntity {
            entity,
            show_death_animation,
        } => Ok(unregister_entity(ctx, *entity, *show_death_animation)),
    }
}

pub fn spawn_entity(
    ctx: &mut SimContext<'_>,
    entity: EntityId,
    data: EntityData,
    cell: HexCoord,
    team: TeamId,
    spawner: Option<EntityId>,
    movement_on_cooldown: bool,
) -> Result<IntentOutcome, SimError> {
    ctx.world.observe_entity_id(entity);
    if ctx.world.entities.contains_key(&entity) {
        error!(entity = entity.0, cell = %cell, "spawn_duplicate_entity_id");
        return Err(SimError::Conflict(SpatialError::CellOccupiedConflict {
            entity,
            cell,
            occupant: entity,
        }));
    }
    if let Some(reason) = ctx.world.occupancy_block(
        ctx.terrain,
        ctx.config.max_stack_height,
        team,
        &data,
        cell,
        None,
    ) {
        debug!(entity = entity.0, cell = %cell, ?reason, "spawn_blocked");
        return Ok(IntentOutcome::Blocked { reason });
    }

    if let Err(err) = ctx
        .world
        .spatial
        .register(entity, team, cell, StackOrderHint::Top, None)
    {
        error!(entity = entity.0, cell = %cell, error = %err, "spawn_register_conflict");
        return Err(err.into());
    }

    let mut spawned = Entity::new(entity, team, data);
    spawned.cell = Some(cell);
    spawned.registered = true;
    if movement_on_cooldown
        && spawned.data.move_cooldown_ticks > 0
        && spawned.data.has_ability(AbilityKind::Move)
    {
        let descriptor = ctx.catalog.descriptor(AbilityKind::Move)?;
        spawned.cooldowns.push(CooldownTimer {
            ability: None,
            kind: AbilityKind::Move,
            channels: descriptor.channels,
            remaining_ticks: spawned.data.move_cooldown_ticks,
        });
    }
    let can_move = spawned.data.has_ability(AbilityKind::Move);
    ctx.world.entities.insert(entity, spawned);
    ctx.emit(Notification::EntityRegistered { entity, team, cell });
    debug!(entity = entity.0, team = team.0, cell = %cell, "entity_spawned");

    let rally_target = spawner
        .and_then(|spawner| ctx.world.entity(spawner))
        .and_then(|spawner| spawner.rally_target);
    if let Some(target) = rally_target.filter(|target| can_move && *target != cell) {
        let mut request = AbilityRequest::new(
            entity,
            AbilityKind::Move,
            AbilityParams::Destination { cell: target },
        );
        request.id = Some(ctx.world.allocate_ability_id());
        queue_ability(ctx, request, false, false, false)?;
    }

    Ok(IntentOutcome::Spawned { entity })
}

pub fn move_entity(
    ctx: &mut SimContext<'_>,
    entity: EntityId,
    destination: HexCoord,
) -> Result<IntentOutcome, SimError> {
    let Some(mover) = ctx.world.entity(entity).filter(|mover| mover.is_alive()) else {
        warn!(entity = entity.0, "move_entity_not_found");
        return Ok(IntentOutcome::UnknownEntity { entity });
    };
    if let Some(reason) = ctx.world.occupancy_block(
        ctx.terrain,
        ctx.config.max_stack_height,
        mover.team,
        &mover.data,
        destination,
        Some(entity),
    ) {
        debug!(entity = entity.0, destination = %destination, ?reason, "move_blocked");
        return Ok(IntentOutcome::Blocked { reason });
    }
    let from = relocate(ctx.world, entity, destination)?;
    Ok(IntentOutcome::Moved {
        entity,
        from,
        to: destination,
    })
}

/// Moves an entity whose destination was already checked against occupancy rules.
pub(crate) fn relocate(
    world: &mut World,
    entity: EntityId,
    destination: HexCoord,
) -> Result<HexCoord, SimError> {
    let from = world.spatial.move_entity(entity, destination).map_err(|err| {
        error!(entity = entity.0, destination = %destination, error = %err, "relocate_conflict");
        err
    })?;
    if let Some(mover) = world.entity_mut(entity) {
        mover.cell = Some(destination);
    }
    Ok(from)
}

pub fn perform_ability(
    ctx: &mut SimContext<'_>,
    request: AbilityRequest,
    clear_queue_first: bool,
    handle_cost: bool,
    from_input: bool,
) -> Result<IntentOutcome, SimError> {
    let id = request.id.ok_or(SimError::UnresolvedIntent)?;
    ctx.world.observe_ability_id(id);
    let catalog = ctx.catalog;
    let behavior = catalog.behavior(request.kind)?;

    let performer_id = request.performer;
    let Some(performer) = ctx.world.entity(performer_id).filter(|p| p.is_alive()) else {
        debug!(ability = id.0, performer = performer_id.0, "perform_performer_missing");
        return Ok(IntentOutcome::AbilityRejected {
            ability: id,
            reason: RejectReason::PerformerMissing,
        });
    };
    if !performer.data.has_ability(request.kind) {
        return Ok(reject(ctx, &request, id, RejectReason::NotInAbilitySet));
    }
    let mut instance = catalog.instantiate(&request, performer)?;
    let cost = behavior.cost(performer, &request.params);

    if clear_queue_first {
        clear_queue(ctx, performer_id)?;
    }

    let mut conflicts = Vec::new();
    let mut blocked_by_uncancelable = false;
    if let Some(performer) = ctx.world.entity(performer_id) {
        for other_id in &performer.in_progress {
            let Some(other) = ctx.world.ability(*other_id) else {
                continue;
            };
            if !other.shares_channel(instance.channels) {
                continue;
            }
            if catalog.descriptor(other.kind)?.cancelable {
                conflicts.push(*other_id);
            } else {
                blocked_by_uncancelable = true;
            }
        }
    }

    let legality = if blocked_by_uncancelable {
        Legality::NotYetLegal
    } else {
        behavior.legality(ctx, &instance)
    };

    match legality {
        Legality::Legal => {
            if handle_cost {
                let team = ctx.world.entity(performer_id).map(|p| p.team);
                let paid = team.is_some_and(|team| ctx.world.treasury.try_spend(team, cost));
                if !paid {
                    return Ok(reject(ctx, &request, id, RejectReason::InsufficientGold));
                }
                instance.paid_cost = cost;
            }
            for superseded in conflicts {
                cancel_ability(ctx, superseded)?;
            }
            instance.state = AbilityState::InProgress;
            ctx.world.abilities.insert(id, instance);
            if let Some(performer) = ctx.world.entity_mut(performer_id) {
                performer.in_progress.push(id);
            }
            ctx.world.mark_dirty(performer_id);
            debug!(
                ability = id.0,
                kind = request.kind.name(),
                performer = performer_id.0,
                from_input,
                "ability_started"
            );
            Ok(IntentOutcome::AbilityStarted { ability: id })
        }
        Legality::NotYetLegal if request.wait_until_legal => {
            queue_ability(ctx, request, false, false, handle_cost)
        }
        Legality::NotYetLegal if blocked_by_uncancelable => {
            Ok(reject(ctx, &request, id, RejectReason::ChannelBusy))
        }
        Legality::NotYetLegal | Legality::IndefinitelyIllegal => {
            debug!(
                ability = id.0,
                kind = request.kind.name(),
                performer = performer_id.0,
                from_input,
                ?legality,
                "ability_illegal"
            );
            Ok(reject(ctx, &request, id, RejectReason::Illegal))
        }
    }
}

pub fn queue_ability(
    ctx: &mut SimContext<'_>,
    request: AbilityRequest,
    clear_queue_first: bool,
    insert_at_front: bool,
    handle_cost: bool,
) -> Result<IntentOutcome, SimError> {
    let id = request.id.ok_or(SimError::UnresolvedIntent)?;
    ctx.world.observe_ability_id(id);
    let catalog = ctx.catalog;
    let behavior = catalog.behavior(request.kind)?;

    let performer_id = request.performer;
    let Some(performer) = ctx.world.entity(performer_id).filter(|p| p.is_alive()) else {
        debug!(ability = id.0, performer = performer_id.0, "queue_performer_missing");
        return Ok(IntentOutcome::AbilityRejected {
            ability: id,
            reason: RejectReason::PerformerMissing,
        });
    };
    if !performer.data.has_ability(request.kind) {
        return Ok(reject(ctx, &request, id, RejectReason::NotInAbilitySet));
    }
    let mut instance = catalog.instantiate(&request, performer)?;
    let cost = behavior.cost(performer, &request.params);
    let team = performer.team;

    if clear_queue_first {
        clear_queue(ctx, performer_id)?;
    }
    if handle_cost {
        if !ctx.world.treasury.try_spend(team, cost) {
            return Ok(reject(ctx, &request, id, RejectReason::InsufficientGold));
        }
        instance.paid_cost = cost;
    }

    instance.state = AbilityState::Queued;
    ctx.world.abilities.insert(id, instance);
    if let Some(performer) = ctx.world.entity_mut(performer_id) {
        if insert_at_front {
            performer.queued.insert(0, id);
        } else {
            performer.queued.push(id);
        }
    }
    ctx.world.mark_dirty(performer_id);
    debug!(
        ability = id.0,
        kind = request.kind.name(),
        performer = performer_id.0,
        insert_at_front,
        "ability_queued"
    );
    Ok(IntentOutcome::AbilityQueued { ability: id })
}

pub fn cancel_ability(ctx: &mut SimContext<'_>, ability: AbilityId) -> Result<IntentOutcome, SimError> {
    if ctx.world.was_canceled(ability) {
        debug!(ability = ability.0, "ability_already_canceled");
        return Ok(IntentOutcome::AlreadyCanceled { ability });
    }
    let Some(kind) = ctx.world.ability(ability).map(|instance| instance.kind) else {
        warn!(ability = ability.0, "ability_cancel_not_found");
        return Ok(IntentOutcome::UnknownAbility { ability });
    };
    let catalog = ctx.catalog;
    let behavior = catalog.behavior(kind)?;
    if !behavior.descriptor().cancelable {
        debug!(ability = ability.0, kind = kind.name(), "ability_not_cancelable");
        return Ok(IntentOutcome::NotCancelable { ability });
    }
    let Some(mut instance) = ctx.world.abilities.remove(&ability) else {
        return Ok(IntentOutcome::UnknownAbility { ability });
    };

    let performer_id = instance.performer;
    if let Some(performer) = ctx.world.entity_mut(performer_id) {
        performer.in_progress.retain(|id| *id != ability);
        performer.queued.retain(|id| *id != ability);
    }
    // Timers it already started keep holding their channels until expiry.
    instance.state = AbilityState::Canceled;
    behavior.on_cancel(ctx, &instance);
    ctx.world.record_canceled(ability, performer_id);
    ctx.world.mark_dirty(performer_id);
    ctx.emit(Notification::AbilityCanceled {
        entity: performer_id,
        ability,
        kind,
    });
    debug!(ability = ability.0, kind = kind.name(), performer = performer_id.0, "ability_canceled");
    Ok(IntentOutcome::Canceled { ability })
}

/// Cancels every cancelable queued ability of `performer`, front to back.
pub fn clear_queue(ctx: &mut SimContext<'_>, performer: EntityId) -> Result<(), SimError> {
    let queued = ctx
        .world
        .entity(performer)
        .map(|entity| entity.queued.clone())
        .unwrap_or_default();
    for ability in queued {
        cancel_ability(ctx, ability)?;
    }
    Ok(())
}

/// Marks the entity for removal; the scheduler removes it after the next full tick.
pub fn unregister_entity(
    ctx: &mut SimContext<'_>,
    entity: EntityId,
    show_death_animation: bool,
) -> IntentOutcome {
    let tick = ctx.world.tick;
    let Some(target) = ctx.world.entity_mut(entity) else {
        warn!(entity = entity.0, "unregister_entity_not_found");
        return IntentOutcome::UnknownEntity { entity };
    };
    if target.pending_removal.is_none() {
        target.pending_removal = Some(PendingRemoval {
            requested_tick: tick,
            show_death_animation,
        });
    }
    IntentOutcome::UnregisterScheduled { entity }
}

/// Removes the entity from the index and the arena, discarding its abilities.
pub(crate) fn finalize_removal(ctx: &mut SimContext<'_>, entity: EntityId) {
    let Some(removed) = ctx.world.entities.remove(&entity) else {
        return;
    };
    for ability in removed.in_progress.iter().chain(removed.queued.iter()) {
        ctx.world.abilities.remove(ability);
    }
    ctx.world.forget_canceled_by(entity);
    ctx.world.spatial.unregister(entity);
    ctx.world.dirty.remove(&entity);
    let show_death_animation = removed
        .pending_removal
        .is_some_and(|pending| pending.show_death_animation);
    ctx.emit(Notification::EntityUnregistered {
        entity,
        team: removed.team,
        show_death_animation,
    });
    debug!(entity = entity.0, team = removed.team.0, "entity_unregistered");
}

fn reject(
    ctx: &mut SimContext<'_>,
    request: &AbilityRequest,
    ability: AbilityId,
    reason: RejectReason,
) -> IntentOutcome {
    debug!(
        ability = ability.0,
        kind = request.kind.name(),
        performer = request.performer.0,
        ?reason,
        "ability_rejected"
    );
    ctx.emit(Notification::AbilityFailed {
        entity: request.performer,
        ability: Some(ability),
        kind: request.kind,
    });
    IntentOutcome::AbilityRejected { ability, reason }
}
