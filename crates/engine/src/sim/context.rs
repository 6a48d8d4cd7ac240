use super::{DamageLedger, Notification, NotificationBus, SimConfig};
use crate::ability::AbilityCatalog;
use crate::grid::TerrainProvider;
use crate::world::World;

/// Borrowed view handed to the scheduler, the mutation layer and ability kinds.
pub struct SimContext<'a> {
    pub world: &'a mut World,
    pub terrain: &'a dyn TerrainProvider,
    pub catalog: &'a AbilityCatalog,
    pub ledger: &'a mut DamageLedger,
    pub events: &'a mut NotificationBus,
    pub config: &'a SimConfig,
}

impl SimContext<'_> {
    pub fn emit(&mut self, notification: Notification) {
        self.events.emit(self.world.tick, notification);
    }

    pub fn tick(&self) -> u64 {
        self.world.tick
    }
}
