mod catalog;
mod kinds;
mod types;

pub use catalog::{AbilityBehavior, AbilityCatalog, AbilityDescriptor};
pub use kinds::{
    AttackBehavior, AttackMoveBehavior, BuildBehavior, ChargeBehavior, HealBehavior,
    HoldPositionBehavior, IncomeBehavior, MoveBehavior, ParadeBehavior, PickupBehavior,
    RallyBehavior, SiegeBehavior,
};
pub use types::{
    AbilityId, AbilityInstance, AbilityKind, AbilityOutcome, AbilityParams, AbilityRequest,
    AbilityResult, AbilityState, Channel, CooldownTimer, ExecutionPhase, FollowUp, Legality,
    PHASE_ORDER,
};
