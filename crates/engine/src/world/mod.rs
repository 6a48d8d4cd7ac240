mod entity;
mod state;
mod treasury;

pub use entity::{Entity, EntityData, EntityId, PendingRemoval, TeamId, NEUTRAL_TEAM};
pub use state::{BlockReason, World};
#[cfg(test)]
pub(crate) use state::CANCELED_HISTORY;
pub use treasury::Treasury;
