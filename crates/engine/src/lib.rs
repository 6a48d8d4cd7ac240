//! Deterministic hex-grid skirmish simulation.
//!
//! The world advances in fixed ticks. Every mutation from outside the tick
//! loop goes through a [`CommandFunnel`], either applied in-process by a
//! [`LocalAuthority`] or forwarded to an [`AuthorityServer`] and echoed back
//! to every [`RemoteReplica`].

pub mod ability;
pub mod command;
pub mod grid;
pub mod replay;
pub mod sim;
pub mod world;

#[cfg(test)]
mod test_support;

pub use ability::{
    AbilityBehavior, AbilityCatalog, AbilityDescriptor, AbilityId, AbilityInstance, AbilityKind,
    AbilityOutcome, AbilityParams, AbilityRequest, AbilityResult, AbilityState, Channel,
    ExecutionPhase, Legality,
};
pub use command::{
    AuthorityServer, CommandFunnel, Intent, IntentOutcome, LinkError, LocalAuthority,
    LoopbackHub, LoopbackLink, RemoteReplica, ReplicaHub, ReplicaLink, Submission,
};
pub use grid::{find_path, HexCoord, HexTilemap, MovementClass, Path, TerrainProvider, TileKind};
pub use replay::{replay, CommandLog, NotificationDigest, ReplayError, ReplayReport};
pub use sim::{
    FixedStepClock, Notification, NotificationEnvelope, SimConfig, SimError, Simulation,
    TickReport,
};
pub use world::{BlockReason, Entity, EntityData, EntityId, TeamId, World, NEUTRAL_TEAM};
