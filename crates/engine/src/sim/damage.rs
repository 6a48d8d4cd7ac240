use tracing::{debug, warn};

use super::{Notification, NotificationBus};
use crate::world::{EntityId, PendingRemoval, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedAttack {
    pub attacker: EntityId,
    pub target: EntityId,
    pub bonus_damage: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackResolution {
    pub attacker: EntityId,
    pub target: EntityId,
    pub damage: u32,
    pub killed: bool,
}

/// Attacks recorded during a tick, applied together once every phase ran.
#[derive(Debug, Default)]
pub struct DamageLedger {
    pending: Vec<QueuedAttack>,
}

impl DamageLedger {
    pub fn record_attack(&mut self, attacker: EntityId, target: EntityId, bonus_damage: u32) {
        self.pending.push(QueuedAttack {
            attacker,
            target,
            bonus_damage,
        });
    }

    pub fn pending(&self) -> &[QueuedAttack] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Applies attacks in recording order. A target that drops to zero credits
    /// the kill to the attack that finished it and is scheduled for removal.
    pub fn flush(&mut self, world: &mut World, events: &mut NotificationBus) -> Vec<AttackResolution> {
        let tick = world.tick;
        let mut resolutions = Vec::with_capacity(self.pending.len());
        for attack in self.pending.drain(..) {
            let base_damage = match world.entity(attack.attacker) {
                Some(attacker) => attacker.data.attack_damage,
                None => {
                    warn!(
                        attacker = attack.attacker.0,
                        target = attack.target.0,
                        "damage_attacker_missing"
                    );
                    0
                }
            };
            let damage = base_damage.saturating_add(attack.bonus_damage);

            let Some(target) = world.entity_mut(attack.target) else {
                debug!(target = attack.target.0, "damage_target_missing");
                continue;
            };
            if !target.is_alive() {
                continue;
            }
            target.hit_points = target.hit_points.saturating_sub(damage);
            target.last_attacker = Some(attack.attacker);
            let remaining_hit_points = target.hit_points;
            let killed = remaining_hit_points == 0;
            if killed {
                target.pending_removal = Some(PendingRemoval {
                    requested_tick: tick,
                    show_death_animation: true,
                });
            }

            events.emit(
                tick,
                Notification::EntityDamaged {
                    attacker: attack.attacker,
                    target: attack.target,
                    amount: damage,
                    remaining_hit_points,
                },
            );
            if killed {
                if let Some(attacker) = world.entity_mut(attack.attacker) {
                    attacker.kill_count = attacker.kill_count.saturating_add(1);
                }
                events.emit(
                    tick,
                    Notification::EntityDied {
                        entity: attack.target,
                        killer: attack.attacker,
                    },
                );
                debug!(
                    target = attack.target.0,
                    killer = attack.attacker.0,
                    tick,
                    "entity_killed"
                );
            }
            resolutions.push(AttackResolution {
                attacker: attack.attacker,
                target: attack.target,
                damage,
                killed,
            });
        }
        resolutions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{HexCoord, StackOrderHint};
    use crate::world::{Entity, EntityData, TeamId, Treasury};

    fn spawn(world: &mut World, team: u32, damage: u32, hit_points: u32, cell: HexCoord) -> EntityId {
        let id = world.allocate_entity_id();
        let data = EntityData {
            attack_damage: damage,
            max_hit_points: hit_points,
            ..EntityData::default()
        };
        let mut entity = Entity::new(id, TeamId(team), data);
        entity.cell = Some(cell);
        entity.registered = true;
        world
            .spatial
            .register(id, TeamId(team), cell, StackOrderHint::Top, None)
            .expect("register");
        world.entities.insert(id, entity);
        id
    }

    #[test]
    fn flush_subtracts_base_plus_bonus_in_recording_order() {
        let mut world = World::new(Treasury::default());
        let mut events = NotificationBus::default();
        let a = spawn(&mut world, 1, 3, 20, HexCoord::new(0, 0));
        let b = spawn(&mut world, 1, 4, 20, HexCoord::new(0, 1));
        let target = spawn(&mut world, 2, 0, 20, HexCoord::new(1, 0));
        let other = spawn(&mut world, 2, 0, 9, HexCoord::new(1, 1));

        let mut ledger = DamageLedger::default();
        ledger.record_attack(b, target, 0);
        ledger.record_attack(a, other, 2);
        ledger.record_attack(a, target, 1);
        assert_eq!(world.entity(target).map(|e| e.hit_points), Some(20));

        let resolutions = ledger.flush(&mut world, &mut events);
        assert!(ledger.is_empty());
        assert_eq!(world.entity(target).map(|e| e.hit_points), Some(20 - 4 - 4));
        assert_eq!(world.entity(other).map(|e| e.hit_points), Some(9 - 5));
        assert_eq!(
            resolutions.iter().map(|r| r.attacker).collect::<Vec<_>>(),
            vec![b, a, a]
        );
        assert_eq!(
            world.entity(target).and_then(|e| e.last_attacker),
            Some(a)
        );
    }

    #[test]
    fn killing_blow_credits_one_kill_and_schedules_removal() {
        let mut world = World::new(Treasury::default());
        let mut events = NotificationBus::default();
        let a = spawn(&mut world, 1, 5, 20, HexCoord::new(0, 0));
        let b = spawn(&mut world, 1, 5, 20, HexCoord::new(0, 1));
        let target = spawn(&mut world, 2, 0, 8, HexCoord::new(1, 0));

        let mut ledger = DamageLedger::default();
        ledger.record_attack(a, target, 0);
        ledger.record_attack(b, target, 0);
        ledger.record_attack(a, target, 0);
        let resolutions = ledger.flush(&mut world, &mut events);

        assert_eq!(resolutions.len(), 2);
        assert!(resolutions[1].killed);
        assert_eq!(world.entity(b).map(|e| e.kill_count), Some(1));
        assert_eq!(world.entity(a).map(|e| e.kill_count), Some(0));
        let dead = world.entity(target).expect("still present until removal");
        assert_eq!(dead.hit_points, 0);
        assert!(dead.pending_removal.is_some());
        let died = events
            .drain()
            .into_iter()
            .filter(|envelope| matches!(envelope.notification, Notification::EntityDied { .. }))
            .count();
        assert_eq!(died, 1);
    }
}
