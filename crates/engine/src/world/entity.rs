use serde::{Deserialize, Serialize};

use crate::ability::{AbilityId, AbilityKind, CooldownTimer};
use crate::grid::{HexCoord, MovementClass};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntityId(pub u64);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TeamId(pub u32);

/// Owner of pickups and other entities no player controls.
pub const NEUTRAL_TEAM: TeamId = TeamId(0);

/// Spawn descriptor for a unit or structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityData {
    pub name: String,
    pub max_hit_points: u32,
    pub attack_damage: u32,
    pub attack_range: u32,
    pub attack_cooldown_ticks: u32,
    pub move_cooldown_ticks: u32,
    pub heal_power: u32,
    pub movement: MovementClass,
    pub is_structure: bool,
    pub abilities: Vec<AbilityKind>,
    pub default_ability: Option<AbilityKind>,
    pub gold_cost: u32,
    pub build_ticks: u32,
    pub income_per_cycle: u32,
    pub income_cooldown_ticks: u32,
    pub pickup_value: u32,
    pub parade_route: Vec<HexCoord>,
}

impl Default for EntityData {
    fn default() -> Self {
        Self {
            name: "unit".to_string(),
            max_hit_points: 10,
            attack_damage: 0,
            attack_range: 1,
            attack_cooldown_ticks: 1,
            move_cooldown_ticks: 1,
            heal_power: 0,
            movement: MovementClass::Infantry,
            is_structure: false,
            abilities: Vec::new(),
            default_ability: None,
            gold_cost: 0,
            build_ticks: 0,
            income_per_cycle: 0,
            income_cooldown_ticks: 10,
            pickup_value: 0,
            parade_route: Vec::new(),
        }
    }
}

impl EntityData {
    pub fn soldier() -> Self {
        Self {
            name: "soldier".to_string(),
            max_hit_points: 30,
            attack_damage: 5,
            attack_range: 1,
            attack_cooldown_ticks: 2,
            move_cooldown_ticks: 2,
            abilities: vec![
                AbilityKind::Move,
                AbilityKind::AttackMove,
                AbilityKind::Attack,
                AbilityKind::HoldPosition,
                AbilityKind::Pickup,
                AbilityKind::Parade,
            ],
            default_ability: Some(AbilityKind::Attack),
            gold_cost: 20,
            build_ticks: 3,
            ..Self::default()
        }
    }

    pub fn cavalry() -> Self {
        Self {
            name: "cavalry".to_string(),
            max_hit_points: 40,
            attack_damage: 6,
            attack_cooldown_ticks: 3,
            move_cooldown_ticks: 1,
            movement: MovementClass::Cavalry,
            abilities: vec![
                AbilityKind::Move,
                AbilityKind::AttackMove,
                AbilityKind::Attack,
                AbilityKind::Charge,
                AbilityKind::HoldPosition,
            ],
            default_ability: Some(AbilityKind::Attack),
            gold_cost: 40,
            build_ticks: 5,
            ..Self::default()
        }
    }

    pub fn healer() -> Self {
        Self {
            name: "healer".to_string(),
            max_hit_points: 20,
            attack_range: 2,
            move_cooldown_ticks: 2,
            heal_power: 3,
            abilities: vec![AbilityKind::Move, AbilityKind::Heal],
            gold_cost: 30,
            build_ticks: 4,
            ..Self::default()
        }
    }

    pub fn catapult() -> Self {
        Self {
            name: "catapult".to_string(),
            max_hit_points: 25,
            attack_damage: 4,
            attack_range: 3,
            attack_cooldown_ticks: 4,
            move_cooldown_ticks: 3,
            movement: MovementClass::Siege,
            abilities: vec![AbilityKind::Move, AbilityKind::Siege],
            gold_cost: 60,
            build_ticks: 6,
            ..Self::default()
        }
    }

    pub fn town_hall() -> Self {
        Self {
            name: "town_hall".to_string(),
            max_hit_points: 200,
            attack_range: 0,
            movement: MovementClass::Structure,
            is_structure: true,
            abilities: vec![AbilityKind::Build, AbilityKind::Rally, AbilityKind::Income],
            income_per_cycle: 5,
            income_cooldown_ticks: 10,
            gold_cost: 150,
            build_ticks: 20,
            ..Self::default()
        }
    }

    pub fn gold_pile(value: u32) -> Self {
        Self {
            name: "gold_pile".to_string(),
            max_hit_points: 1,
            attack_range: 0,
            movement: MovementClass::Structure,
            pickup_value: value,
            ..Self::default()
        }
    }

    pub fn has_ability(&self, kind: AbilityKind) -> bool {
        self.abilities.contains(&kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRemoval {
    pub requested_tick: u64,
    pub show_death_animation: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub team: TeamId,
    pub data: EntityData,
    pub cell: Option<HexCoord>,
    pub hit_points: u32,
    pub in_progress: Vec<AbilityId>,
    pub queued: Vec<AbilityId>,
    pub cooldowns: Vec<CooldownTimer>,
    pub kill_count: u32,
    pub rally_target: Option<HexCoord>,
    pub last_attacker: Option<EntityId>,
    pub parade_cursor: usize,
    pub registered: bool,
    pub pending_removal: Option<PendingRemoval>,
}

impl Entity {
    pub fn new(id: EntityId, team: TeamId, data: EntityData) -> Self {
        let hit_points = data.max_hit_points;
        Self {
            id,
            team,
            data,
            cell: None,
            hit_points,
            in_progress: Vec::new(),
            queued: Vec::new(),
            cooldowns: Vec::new(),
            kill_count: 0,
            rally_target: None,
            last_attacker: None,
            parade_cursor: 0,
            registered: false,
            pending_removal: None,
        }
    }

    /// Registered with hit points left. Entities awaiting removal after a
    /// command still count; dead ones do not.
    pub fn is_alive(&self) -> bool {
        self.registered && self.hit_points > 0
    }

    pub fn is_pickup(&self) -> bool {
        self.data.pickup_value > 0
    }

    pub fn holds_ability(&self, ability: AbilityId) -> bool {
        self.in_progress.contains(&ability) || self.queued.contains(&ability)
    }
}
