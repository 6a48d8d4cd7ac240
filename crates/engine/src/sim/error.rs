use thiserror::Error;

use crate::ability::AbilityKind;
use crate::command::LinkError;
use crate::grid::SpatialError;

/// Faults that stop the simulation. Validation failures are never errors.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("no behavior registered for ability kind {0:?}")]
    UnknownAbilityKind(AbilityKind),
    #[error("spatial conflict on a pre-validated placement: {0}")]
    Conflict(#[from] SpatialError),
    #[error("intent reached the mutation layer without authority-assigned ids")]
    UnresolvedIntent,
    #[error("authority reported tick {authority} while replica is at tick {replica}")]
    TickDesync { authority: u64, replica: u64 },
    #[error(transparent)]
    Link(#[from] LinkError),
}
