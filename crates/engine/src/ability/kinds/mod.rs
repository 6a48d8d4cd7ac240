mod combat;
mod economy;
mod movement;
mod support;

pub use combat::{AttackBehavior, SiegeBehavior};
pub use economy::{BuildBehavior, IncomeBehavior, RallyBehavior};
pub use movement::{
    AttackMoveBehavior, ChargeBehavior, HoldPositionBehavior, MoveBehavior, ParadeBehavior,
};
pub use support::{HealBehavior, PickupBehavior};

use tracing::error;

use super::Channel;
use crate::command::mutation;
use crate::grid::{find_path, HexCoord, PathRequest};
use crate::sim::SimContext;
use crate::world::EntityId;

const MOVEMENT: &[Channel] = &[Channel::Movement];
const ATTACK: &[Channel] = &[Channel::Attack];
const PRODUCTION: &[Channel] = &[Channel::Production];
const ECONOMY: &[Channel] = &[Channel::Economy];
const SUPPORT: &[Channel] = &[Channel::Support];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Already standing on the destination.
    Arrived,
    /// No path gets any closer.
    Stuck,
    /// The next cell is temporarily full.
    Waiting,
    Moved {
        to: HexCoord,
        entry_cost: u32,
        /// The step landed on the end of the path, reached or not.
        final_step: bool,
    },
    Fault,
}

/// Advances `mover` one cell along a fresh path to `destination`.
fn step_toward(ctx: &mut SimContext<'_>, mover: EntityId, destination: HexCoord) -> Step {
    let Some((team, start, movement)) = ctx
        .world
        .entity(mover)
        .and_then(|entity| Some((entity.team, entity.cell?, entity.data.movement)))
    else {
        return Step::Fault;
    };
    if start == destination {
        return Step::Arrived;
    }

    let world = &*ctx.world;
    let blocked = |cell: HexCoord| world.blocks_passage(team, cell);
    let path = match find_path(
        ctx.terrain,
        &blocked,
        PathRequest {
            start,
            destination,
            movement,
        },
        ctx.config.search_limits(),
    ) {
        Ok(path) => path,
        Err(err) => {
            error!(entity = mover.0, error = %err, "step_pathfind_failed");
            return Step::Fault;
        }
    };
    let Some(next) = path.first_step() else {
        return Step::Stuck;
    };
    let final_step = path.cells.len() == 1;

    let Some(mover_entity) = ctx.world.entity(mover) else {
        return Step::Fault;
    };
    if ctx
        .world
        .occupancy_block(
            ctx.terrain,
            ctx.config.max_stack_height,
            team,
            &mover_entity.data,
            next,
            Some(mover),
        )
        .is_some()
    {
        return Step::Waiting;
    }
    let entry_cost = ctx.terrain.entry_cost(next, movement).unwrap_or(1);
    match mutation::relocate(ctx.world, mover, next) {
        Ok(_) => Step::Moved {
            to: next,
            entry_cost,
            final_step,
        },
        Err(err) => {
            error!(entity = mover.0, error = %err, "step_relocate_failed");
            Step::Fault
        }
    }
}
