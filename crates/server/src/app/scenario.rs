use hexfront_engine::ability::{AbilityKind, AbilityParams, AbilityRequest};
use hexfront_engine::command::{CommandFunnel, IntentOutcome, Submission};
use hexfront_engine::grid::{HexCoord, HexTilemap, TileKind};
use hexfront_engine::sim::SimError;
use hexfront_engine::world::{EntityData, EntityId, TeamId, NEUTRAL_TEAM};
use serde::Deserialize;
use tracing::{info, warn};

const TEAM_WEST: TeamId = TeamId(1);
const TEAM_EAST: TeamId = TeamId(2);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ScenarioConfig {
    pub(crate) map_width: u32,
    pub(crate) map_height: u32,
    pub(crate) soldiers_per_team: u32,
    pub(crate) gold_piles: u32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            map_width: 16,
            map_height: 10,
            soldiers_per_team: 4,
            gold_piles: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StagedSkirmish {
    pub(crate) halls: Vec<EntityId>,
    pub(crate) soldiers: Vec<EntityId>,
    pub(crate) pickups: Vec<EntityId>,
}

/// Plains with a forest belt down the middle, a pond and a ridge of hills.
pub(crate) fn build_terrain(config: &ScenarioConfig) -> HexTilemap {
    let width = config.map_width.max(6);
    let height = config.map_height.max(4);
    let mut map = HexTilemap::filled(width, height, TileKind::Plains);
    let middle = (width / 2) as i32;
    for r in 0..height as i32 {
        if r % 3 != 1 {
            let _ = map.set_tile(HexCoord::new(middle, r), TileKind::Forest);
        }
    }
    let _ = map.set_tile(HexCoord::new(middle - 2, 1), TileKind::Water);
    let _ = map.set_tile(HexCoord::new(middle - 2, 2), TileKind::Water);
    for r in (height as i32 - 3)..height as i32 {
        let _ = map.set_tile(HexCoord::new(middle + 2, r), TileKind::Hills);
    }
    map.set_slowed(HexCoord::new(middle + 1, 0), true);
    map
}

/// Spawns both armies through the funnel and issues their opening orders.
pub(crate) fn stage(
    funnel: &mut impl CommandFunnel,
    config: &ScenarioConfig,
) -> Result<StagedSkirmish, SimError> {
    let width = config.map_width.max(6) as i32;
    let height = config.map_height.max(4) as i32;
    let mut staged = StagedSkirmish::default();

    let west_hall = HexCoord::new(0, height / 2);
    let east_hall = HexCoord::new(width - 1, height / 2);
    for (team, cell, rally) in [
        (TEAM_WEST, west_hall, HexCoord::new(2, height / 2)),
        (TEAM_EAST, east_hall, HexCoord::new(width - 3, height / 2)),
    ] {
        let Some(hall) = spawned(funnel.spawn_entity(EntityData::town_hall(), cell, team, None, false)?)
        else {
            continue;
        };
        staged.halls.push(hall);
        funnel.perform_ability(
            AbilityRequest::new(hall, AbilityKind::Income, AbilityParams::None),
            false,
            false,
            false,
        )?;
        funnel.perform_ability(
            AbilityRequest::new(hall, AbilityKind::Rally, AbilityParams::Destination { cell: rally }),
            false,
            false,
            false,
        )?;
        funnel.queue_ability(
            AbilityRequest::new(
                hall,
                AbilityKind::Build,
                AbilityParams::Blueprint {
                    data: Box::new(EntityData::soldier()),
                },
            ),
            false,
            false,
            true,
        )?;
    }

    for index in 0..config.soldiers_per_team as i32 {
        let r = index % height;
        let column = index / height;
        for (team, q, target) in [
            (TEAM_WEST, 1 + column, east_hall),
            (TEAM_EAST, width - 2 - column, west_hall),
        ] {
            let cell = HexCoord::new(q, r);
            let Some(soldier) =
                spawned(funnel.spawn_entity(EntityData::soldier(), cell, team, None, false)?)
            else {
                continue;
            };
            staged.soldiers.push(soldier);
            funnel.perform_ability(
                AbilityRequest::new(
                    soldier,
                    AbilityKind::AttackMove,
                    AbilityParams::Destination { cell: target },
                ),
                true,
                false,
                false,
            )?;
        }
    }

    let middle = width / 2;
    for index in 0..config.gold_piles as i32 {
        let cell = HexCoord::new(middle - 1, (1 + index * 3) % height);
        if let Some(pile) =
            spawned(funnel.spawn_entity(EntityData::gold_pile(15), cell, NEUTRAL_TEAM, None, false)?)
        {
            staged.pickups.push(pile);
        }
    }

    info!(
        halls = staged.halls.len(),
        soldiers = staged.soldiers.len(),
        pickups = staged.pickups.len(),
        "scenario_staged"
    );
    Ok(staged)
}

/// The spawned id when the funnel applied the spawn locally.
fn spawned(submission: Submission) -> Option<EntityId> {
    match submission {
        Submission::Applied(IntentOutcome::Spawned { entity }) => Some(entity),
        Submission::Applied(outcome) => {
            warn!(?outcome, "scenario_spawn_skipped");
            None
        }
        Submission::Forwarded { .. } => None,
    }
}
