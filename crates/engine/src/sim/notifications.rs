use serde::{Deserialize, Serialize};

use crate::ability::{AbilityId, AbilityKind};
use crate::grid::HexCoord;
use crate::world::{EntityId, TeamId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// Something in the spatial index changed; re-query.
    CollectionChanged {
        version: u64,
    },
    AbilitySetChanged {
        entity: EntityId,
    },
    AbilityPerformed {
        entity: EntityId,
        ability: Option<AbilityId>,
        kind: AbilityKind,
    },
    AbilityFailed {
        entity: EntityId,
        ability: Option<AbilityId>,
        kind: AbilityKind,
    },
    AbilityCanceled {
        entity: EntityId,
        ability: AbilityId,
        kind: AbilityKind,
    },
    CooldownExpired {
        entity: EntityId,
        ability: Option<AbilityId>,
        kind: AbilityKind,
    },
    EntityRegistered {
        entity: EntityId,
        team: TeamId,
        cell: HexCoord,
    },
    EntityUnregistered {
        entity: EntityId,
        team: TeamId,
        show_death_animation: bool,
    },
    EntityDamaged {
        attacker: EntityId,
        target: EntityId,
        amount: u32,
        remaining_hit_points: u32,
    },
    EntityDied {
        entity: EntityId,
        killer: EntityId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    CollectionChanged,
    AbilitySetChanged,
    AbilityPerformed,
    AbilityFailed,
    AbilityCanceled,
    CooldownExpired,
    EntityRegistered,
    EntityUnregistered,
    EntityDamaged,
    EntityDied,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::CollectionChanged { .. } => NotificationKind::CollectionChanged,
            Self::AbilitySetChanged { .. } => NotificationKind::AbilitySetChanged,
            Self::AbilityPerformed { .. } => NotificationKind::AbilityPerformed,
            Self::AbilityFailed { .. } => NotificationKind::AbilityFailed,
            Self::AbilityCanceled { .. } => NotificationKind::AbilityCanceled,
            Self::CooldownExpired { .. } => NotificationKind::CooldownExpired,
            Self::EntityRegistered { .. } => NotificationKind::EntityRegistered,
            Self::EntityUnregistered { .. } => NotificationKind::EntityUnregistered,
            Self::EntityDamaged { .. } => NotificationKind::EntityDamaged,
            Self::EntityDied { .. } => NotificationKind::EntityDied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub tick: u64,
    pub notification: Notification,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationCounts {
    pub collection_changed: u32,
    pub ability_set_changed: u32,
    pub ability_performed: u32,
    pub ability_failed: u32,
    pub ability_canceled: u32,
    pub cooldown_expired: u32,
    pub entity_registered: u32,
    pub entity_unregistered: u32,
    pub entity_damaged: u32,
    pub entity_died: u32,
}

impl NotificationCounts {
    fn record(&mut self, kind: NotificationKind) {
        let counter = match kind {
            NotificationKind::CollectionChanged => &mut self.collection_changed,
            NotificationKind::AbilitySetChanged => &mut self.ability_set_changed,
            NotificationKind::AbilityPerformed => &mut self.ability_performed,
            NotificationKind::AbilityFailed => &mut self.ability_failed,
            NotificationKind::AbilityCanceled => &mut self.ability_canceled,
            NotificationKind::CooldownExpired => &mut self.cooldown_expired,
            NotificationKind::EntityRegistered => &mut self.entity_registered,
            NotificationKind::EntityUnregistered => &mut self.entity_unregistered,
            NotificationKind::EntityDamaged => &mut self.entity_damaged,
            NotificationKind::EntityDied => &mut self.entity_died,
        };
        *counter = counter.saturating_add(1);
    }
}

/// Outbound notifications waiting for observers to pull them.
///
/// Observers only ever see what was emitted up to the last flush point; the
/// bus itself never calls back into observers.
#[derive(Debug, Default)]
pub struct NotificationBus {
    pending: Vec<NotificationEnvelope>,
    current_tick_counts: NotificationCounts,
    last_tick_counts: NotificationCounts,
}

impl NotificationBus {
    pub fn emit(&mut self, tick: u64, notification: Notification) {
        self.current_tick_counts.record(notification.kind());
        self.pending.push(NotificationEnvelope { tick, notification });
    }

    pub fn drain(&mut self) -> Vec<NotificationEnvelope> {
        std::mem::take(&mut self.pending)
    }

    pub fn iter_pending(&self) -> impl Iterator<Item = &NotificationEnvelope> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn finish_tick_rollover(&mut self) {
        self.last_tick_counts = std::mem::take(&mut self.current_tick_counts);
    }

    pub fn last_tick_counts(&self) -> NotificationCounts {
        self.last_tick_counts
    }
}
