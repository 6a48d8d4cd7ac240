use serde::{Deserialize, Serialize};

use crate::ability::{AbilityId, AbilityRequest};
use crate::grid::HexCoord;
use crate::world::{BlockReason, EntityData, EntityId, TeamId};

/// One requested world mutation. Ids left as `None` are assigned by the
/// authority before the intent is applied anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    SpawnEntity {
        #[serde(default)]
        entity: Option<EntityId>,
        data: EntityData,
        cell: HexCoord,
        team: TeamId,
        #[serde(default)]
        spawner: Option<EntityId>,
        #[serde(default)]
        movement_on_cooldown: bool,
    },
    MoveEntity {
        entity: EntityId,
        destination: HexCoord,
    },
    PerformAbility {
        request: AbilityRequest,
        #[serde(default)]
        clear_queue_first: bool,
        #[serde(default)]
        handle_cost: bool,
        #[serde(default)]
        from_input: bool,
    },
    QueueAbility {
        request: AbilityRequest,
        #[serde(default)]
        clear_queue_first: bool,
        #[serde(default)]
        insert_at_front: bool,
        #[serde(default)]
        handle_cost: bool,
    },
    CancelAbility {
        ability: AbilityId,
    },
    UnregisterEntity {
        entity: EntityId,
        #[serde(default)]
        show_death_animation: bool,
    },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SpawnEntity { .. } => "spawn_entity",
            Self::MoveEntity { .. } => "move_entity",
            Self::PerformAbility { .. } => "perform_ability",
            Self::QueueAbility { .. } => "queue_ability",
            Self::CancelAbility { .. } => "cancel_ability",
            Self::UnregisterEntity { .. } => "unregister_entity",
        }
    }

    pub fn is_resolved(&self) -> bool {
        match self {
            Self::SpawnEntity { entity, .. } => entity.is_some(),
            Self::PerformAbility { request, .. } | Self::QueueAbility { request, .. } => {
                request.id.is_some()
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    PerformerMissing,
    NotInAbilitySet,
    InsufficientGold,
    Illegal,
    ChannelBusy,
}

/// What applying an intent did. Replicas compare these against the authority's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentOutcome {
    Spawned { entity: EntityId },
    Blocked { reason: BlockReason },
    Moved { entity: EntityId, from: HexCoord, to: HexCoord },
    AbilityStarted { ability: AbilityId },
    AbilityQueued { ability: AbilityId },
    AbilityRejected { ability: AbilityId, reason: RejectReason },
    Canceled { ability: AbilityId },
    AlreadyCanceled { ability: AbilityId },
    NotCancelable { ability: AbilityId },
    UnregisterScheduled { entity: EntityId },
    UnknownEntity { entity: EntityId },
    UnknownAbility { ability: AbilityId },
}

impl IntentOutcome {
    /// Whether the world changed.
    pub fn applied(&self) -> bool {
        matches!(
            self,
            Self::Spawned { .. }
                | Self::Moved { .. }
                | Self::AbilityStarted { .. }
                | Self::AbilityQueued { .. }
                | Self::Canceled { .. }
                | Self::UnregisterScheduled { .. }
        )
    }
}
