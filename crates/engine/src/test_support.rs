//! Fixtures shared by the unit tests of the mutation layer and ability kinds.

use std::sync::Arc;

use crate::ability::{AbilityCatalog, AbilityId, AbilityKind, AbilityParams, AbilityRequest};
use crate::command::{Intent, IntentOutcome};
use crate::grid::{HexCoord, HexTilemap, TileKind};
use crate::sim::{SimConfig, Simulation};
use crate::world::{Entity, EntityData, EntityId, TeamId};

pub(crate) const RED: TeamId = TeamId(1);
pub(crate) const BLUE: TeamId = TeamId(2);

pub(crate) fn plains(width: u32, height: u32) -> Simulation {
    plains_with(SimConfig::default(), width, height)
}

pub(crate) fn plains_with(config: SimConfig, width: u32, height: u32) -> Simulation {
    Simulation::new(
        config,
        Arc::new(HexTilemap::filled(width, height, TileKind::Plains)),
        Arc::new(AbilityCatalog::standard()),
    )
}

pub(crate) fn spawn(sim: &mut Simulation, data: EntityData, team: TeamId, cell: HexCoord) -> EntityId {
    spawn_from(sim, data, team, cell, None, false)
}

pub(crate) fn spawn_from(
    sim: &mut Simulation,
    data: EntityData,
    team: TeamId,
    cell: HexCoord,
    spawner: Option<EntityId>,
    movement_on_cooldown: bool,
) -> EntityId {
    let intent = sim.resolve_ids(Intent::SpawnEntity {
        entity: None,
        data,
        cell,
        team,
        spawner,
        movement_on_cooldown,
    });
    match sim.apply_intent(&intent).expect("apply") {
        IntentOutcome::Spawned { entity } => entity,
        other => panic!("spawn failed: {other:?}"),
    }
}

pub(crate) fn request(performer: EntityId, kind: AbilityKind, params: AbilityParams) -> AbilityRequest {
    AbilityRequest::new(performer, kind, params)
}

pub(crate) fn destination(q: i32, r: i32) -> AbilityParams {
    AbilityParams::Destination {
        cell: HexCoord::new(q, r),
    }
}

pub(crate) fn target(entity: EntityId) -> AbilityParams {
    AbilityParams::Target { entity }
}

pub(crate) fn perform(sim: &mut Simulation, request: AbilityRequest) -> IntentOutcome {
    perform_with(sim, request, false)
}

pub(crate) fn perform_paid(sim: &mut Simulation, request: AbilityRequest) -> IntentOutcome {
    perform_with(sim, request, true)
}

fn perform_with(sim: &mut Simulation, request: AbilityRequest, handle_cost: bool) -> IntentOutcome {
    let intent = sim.resolve_ids(Intent::PerformAbility {
        request,
        clear_queue_first: false,
        handle_cost,
        from_input: true,
    });
    sim.apply_intent(&intent).expect("apply")
}

pub(crate) fn queue(
    sim: &mut Simulation,
    request: AbilityRequest,
    clear_queue_first: bool,
    insert_at_front: bool,
) -> IntentOutcome {
    let intent = sim.resolve_ids(Intent::QueueAbility {
        request,
        clear_queue_first,
        insert_at_front,
        handle_cost: false,
    });
    sim.apply_intent(&intent).expect("apply")
}

pub(crate) fn cancel(sim: &mut Simulation, ability: AbilityId) -> IntentOutcome {
    sim.apply_intent(&Intent::CancelAbility { ability })
        .expect("apply")
}

pub(crate) fn started(outcome: IntentOutcome) -> AbilityId {
    match outcome {
        IntentOutcome::AbilityStarted { ability } => ability,
        other => panic!("expected a started ability, got {other:?}"),
    }
}

pub(crate) fn queued(outcome: IntentOutcome) -> AbilityId {
    match outcome {
        IntentOutcome::AbilityQueued { ability } => ability,
        other => panic!("expected a queued ability, got {other:?}"),
    }
}

pub(crate) fn ticks(sim: &mut Simulation, count: u32) {
    for _ in 0..count {
        sim.tick().expect("tick");
    }
}

pub(crate) fn entity(sim: &Simulation, id: EntityId) -> &Entity {
    sim.world().entity(id).expect("entity")
}

pub(crate) fn cell_of(sim: &Simulation, id: EntityId) -> Option<HexCoord> {
    sim.world().entity(id).and_then(|entity| entity.cell)
}
