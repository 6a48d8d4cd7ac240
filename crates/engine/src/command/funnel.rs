use crate::ability::{AbilityId, AbilityRequest};
use crate::grid::HexCoord;
use crate::sim::SimError;
use crate::world::{EntityData, EntityId, TeamId};

use super::{Intent, IntentOutcome};

/// What happened to a submitted intent on this side of the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Applied synchronously by a local authority.
    Applied(IntentOutcome),
    /// Sent to a remote authority; the result arrives later as an echo.
    Forwarded { sequence: u64 },
}

impl Submission {
    pub fn outcome(&self) -> Option<IntentOutcome> {
        match self {
            Self::Applied(outcome) => Some(*outcome),
            Self::Forwarded { .. } => None,
        }
    }
}

/// Entry point for every world mutation requested from outside the scheduler.
///
/// Local and remote backends implement `submit`; the named operations are
/// thin builders over it so both backends share one contract.
pub trait CommandFunnel {
    fn submit(&mut self, intent: Intent) -> Result<Submission, SimError>;

    fn spawn_entity(
        &mut self,
        data: EntityData,
        cell: HexCoord,
        team: TeamId,
        spawner: Option<EntityId>,
        movement_on_cooldown: bool,
    ) -> Result<Submission, SimError> {
        self.submit(Intent::SpawnEntity {
            entity: None,
            data,
            cell,
            team,
            spawner,
            movement_on_cooldown,
        })
    }

    fn move_entity(
        &mut self,
        entity: EntityId,
        destination: HexCoord,
    ) -> Result<Submission, SimError> {
        self.submit(Intent::MoveEntity {
            entity,
            destination,
        })
    }

    fn perform_ability(
        &mut self,
        request: AbilityRequest,
        clear_queue_first: bool,
        handle_cost: bool,
        from_input: bool,
    ) -> Result<Submission, SimError> {
        self.submit(Intent::PerformAbility {
            request,
            clear_queue_first,
            handle_cost,
            from_input,
        })
    }

    fn queue_ability(
        &mut self,
        request: AbilityRequest,
        clear_queue_first: bool,
        insert_at_front: bool,
        handle_cost: bool,
    ) -> Result<Submission, SimError> {
        self.submit(Intent::QueueAbility {
            request,
            clear_queue_first,
            insert_at_front,
            handle_cost,
        })
    }

    fn cancel_ability(&mut self, ability: AbilityId) -> Result<Submission, SimError> {
        self.submit(Intent::CancelAbility { ability })
    }

    fn unregister_entity(
        &mut self,
        entity: EntityId,
        show_death_animation: bool,
    ) -> Result<Submission, SimError> {
        self.submit(Intent::UnregisterEntity {
            entity,
            show_death_animation,
        })
    }
}
