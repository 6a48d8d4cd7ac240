mod clock;
mod config;
mod context;
mod damage;
mod error;
mod notifications;
mod scheduler;
mod simulation;

pub use clock::{FixedStepClock, StepPlan};
pub use config::SimConfig;
pub use context::SimContext;
pub use damage::{AttackResolution, DamageLedger, QueuedAttack};
pub use error::SimError;
pub use notifications::{
    Notification, NotificationBus, NotificationCounts, NotificationEnvelope, NotificationKind,
};
pub use scheduler::{run_tick, TickReport};
pub use simulation::Simulation;
