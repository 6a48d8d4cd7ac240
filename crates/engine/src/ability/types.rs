use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::HexCoord;
use crate::world::{EntityData, EntityId};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AbilityId(pub u64);

impl fmt::Display for AbilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum AbilityKind {
    Move,
    AttackMove,
    Charge,
    HoldPosition,
    Parade,
    Attack,
    Siege,
    Heal,
    Build,
    Rally,
    Income,
    Pickup,
}

impl AbilityKind {
    pub const ALL: [AbilityKind; 12] = [
        AbilityKind::Move,
        AbilityKind::AttackMove,
        AbilityKind::Charge,
        AbilityKind::HoldPosition,
        AbilityKind::Parade,
        AbilityKind::Attack,
        AbilityKind::Siege,
        AbilityKind::Heal,
        AbilityKind::Build,
        AbilityKind::Rally,
        AbilityKind::Income,
        AbilityKind::Pickup,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::AttackMove => "attack_move",
            Self::Charge => "charge",
            Self::HoldPosition => "hold_position",
            Self::Parade => "parade",
            Self::Attack => "attack",
            Self::Siege => "siege",
            Self::Heal => "heal",
            Self::Build => "build",
            Self::Rally => "rally",
            Self::Income => "income",
            Self::Pickup => "pickup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionPhase {
    PreInteractionGridUpdate,
    Interaction,
    PostInteractionGridUpdate,
}

pub const PHASE_ORDER: [ExecutionPhase; 3] = [
    ExecutionPhase::PreInteractionGridUpdate,
    ExecutionPhase::Interaction,
    ExecutionPhase::PostInteractionGridUpdate,
];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Channel {
    Movement,
    Attack,
    Production,
    Economy,
    Support,
}

/// Kind-specific payload; a kind handed the wrong payload is indefinitely illegal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbilityParams {
    None,
    Destination { cell: HexCoord },
    Target { entity: EntityId },
    Blueprint { data: Box<EntityData> },
}

impl AbilityParams {
    pub fn destination(&self) -> Option<HexCoord> {
        match self {
            Self::Destination { cell } => Some(*cell),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<EntityId> {
        match self {
            Self::Target { entity } => Some(*entity),
            _ => None,
        }
    }

    pub fn blueprint(&self) -> Option<&EntityData> {
        match self {
            Self::Blueprint { data } => Some(data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbilityResult {
    CompletedWithEffect,
    CompletedWithoutEffect,
    IncompleteWithEffect,
    IncompleteWithoutEffect,
    Failed,
}

impl AbilityResult {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::CompletedWithEffect | Self::CompletedWithoutEffect | Self::Failed
        )
    }

    pub fn had_effect(self) -> bool {
        matches!(self, Self::CompletedWithEffect | Self::IncompleteWithEffect)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Legality {
    Legal,
    NotYetLegal,
    IndefinitelyIllegal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbilityState {
    Queued,
    InProgress,
    CompletedWithEffect,
    CompletedWithoutEffect,
    Failed,
    Canceled,
}

/// What a caller asks for; the authority fills in `id` before applying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityRequest {
    #[serde(default)]
    pub id: Option<AbilityId>,
    pub performer: EntityId,
    pub kind: AbilityKind,
    pub params: AbilityParams,
    #[serde(default)]
    pub wait_until_legal: bool,
}

impl AbilityRequest {
    pub fn new(performer: EntityId, kind: AbilityKind, params: AbilityParams) -> Self {
        Self {
            id: None,
            performer,
            kind,
            params,
            wait_until_legal: false,
        }
    }

    pub fn waiting_until_legal(mut self) -> Self {
        self.wait_until_legal = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityInstance {
    /// `None` only for a default ability attempted in place for one tick.
    pub id: Option<AbilityId>,
    pub kind: AbilityKind,
    pub params: AbilityParams,
    pub performer: EntityId,
    pub phase: ExecutionPhase,
    pub channels: &'static [Channel],
    pub wait_until_legal: bool,
    pub cooldown_ticks: u32,
    pub state: AbilityState,
    /// Ticks this instance has produced an effect; kinds use it as their step counter.
    pub progress: u32,
    pub paid_cost: u32,
}

impl AbilityInstance {
    pub fn shares_channel(&self, channels: &[Channel]) -> bool {
        self.channels.iter().any(|channel| channels.contains(channel))
    }
}

/// Blocks `channels` on one entity until `remaining_ticks` runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownTimer {
    pub ability: Option<AbilityId>,
    pub kind: AbilityKind,
    pub channels: &'static [Channel],
    pub remaining_ticks: u32,
}

impl CooldownTimer {
    pub fn blocks_any(&self, channels: &[Channel]) -> bool {
        self.channels.iter().any(|channel| channels.contains(channel))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// Put this same instance back at the end of the queue.
    Requeue,
    /// Queue a new ability for the performer, ahead of anything already queued.
    Spawn(AbilityRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityOutcome {
    pub result: AbilityResult,
    /// Overrides the instance cooldown. Without an override a cooldown only
    /// starts when the attempt had an effect.
    pub cooldown_ticks: Option<u32>,
    pub follow_up: Option<FollowUp>,
}

impl AbilityOutcome {
    pub fn new(result: AbilityResult) -> Self {
        Self {
            result,
            cooldown_ticks: None,
            follow_up: None,
        }
    }

    pub fn failed() -> Self {
        Self::new(AbilityResult::Failed)
    }

    pub fn with_cooldown(mut self, ticks: u32) -> Self {
        self.cooldown_ticks = Some(ticks);
        self
    }

    pub fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = Some(follow_up);
        self
    }
}
