use std::sync::Arc;

use tracing::info;

use super::scheduler::{self, TickReport};
use super::{
    DamageLedger, NotificationBus, NotificationCounts, NotificationEnvelope, SimConfig,
    SimContext, SimError,
};
use crate::ability::AbilityCatalog;
use crate::command::{mutation, Intent, IntentOutcome};
use crate::grid::TerrainProvider;
use crate::world::{Treasury, World};

/// Owns one world and everything needed to advance it deterministically.
pub struct Simulation {
    config: SimConfig,
    terrain: Arc<dyn TerrainProvider>,
    catalog: Arc<AbilityCatalog>,
    world: World,
    ledger: DamageLedger,
    events: NotificationBus,
}

impl Simulation {
    pub fn new(
        config: SimConfig,
        terrain: Arc<dyn TerrainProvider>,
        catalog: Arc<AbilityCatalog>,
    ) -> Self {
        let treasury = Treasury::seeded(&config.teams, config.starting_gold);
        info!(
            teams = config.teams.len(),
            starting_gold = config.starting_gold,
            update_frequency_ms = config.update_frequency_ms,
            "simulation_created"
        );
        Self {
            config,
            terrain,
            catalog,
            world: World::new(treasury),
            ledger: DamageLedger::default(),
            events: NotificationBus::default(),
        }
    }

    pub fn context(&mut self) -> SimContext<'_> {
        SimContext {
            world: &mut self.world,
            terrain: self.terrain.as_ref(),
            catalog: self.catalog.as_ref(),
            ledger: &mut self.ledger,
            events: &mut self.events,
            config: &self.config,
        }
    }

    pub fn tick(&mut self) -> Result<TickReport, SimError> {
        let mut ctx = self.context();
        scheduler::run_tick(&mut ctx)
    }

    /// Authority-side id assignment. Replicas never call this.
    pub fn resolve_ids(&mut self, intent: Intent) -> Intent {
        mutation::resolve_ids(&mut self.world, intent)
    }

    /// Applies an id-resolved intent and publishes the resulting change
    /// notifications before returning.
    pub fn apply_intent(&mut self, intent: &Intent) -> Result<IntentOutcome, SimError> {
        let mut ctx = self.context();
        let outcome = mutation::apply_intent(&mut ctx, intent)?;
        scheduler::flush_observers(&mut ctx);
        Ok(outcome)
    }

    pub fn drain_notifications(&mut self) -> Vec<NotificationEnvelope> {
        self.events.drain()
    }

    pub fn last_tick_counts(&self) -> NotificationCounts {
        self.events.last_tick_counts()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn current_tick(&self) -> u64 {
        self.world.tick()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn terrain(&self) -> &Arc<dyn TerrainProvider> {
        &self.terrain
    }

    pub fn catalog(&self) -> &Arc<AbilityCatalog> {
        &self.catalog
    }
}
