use std::sync::Arc;

use tracing::{info, warn};

use super::{CommandLog, NotificationDigest, ReplayError};
use crate::ability::AbilityCatalog;
use crate::grid::TerrainProvider;
use crate::sim::{SimConfig, Simulation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub ticks: u64,
    pub commands_applied: usize,
    pub commands_skipped: usize,
    pub notifications: u64,
    pub final_entity_count: usize,
    pub digest: String,
}

/// Re-runs a recorded session from an empty world.
///
/// Each command is applied right before the tick after its stamp, exactly
/// where the recording authority applied it. Commands stamped after `ticks`
/// are not applied.
pub fn replay(
    config: SimConfig,
    terrain: Arc<dyn TerrainProvider>,
    catalog: Arc<AbilityCatalog>,
    log: &CommandLog,
    ticks: u64,
) -> Result<ReplayReport, ReplayError> {
    let mut sim = Simulation::new(config, terrain, catalog);
    let mut digest = NotificationDigest::new();
    let commands = log.commands();
    let mut next = 0usize;

    loop {
        let tick = sim.current_tick();
        while let Some(command) = commands.get(next).filter(|command| command.tick <= tick) {
            sim.apply_intent(&command.intent)?;
            next += 1;
        }
        if tick >= ticks {
            break;
        }
        sim.tick()?;
        digest.absorb(&sim.drain_notifications())?;
    }
    digest.absorb(&sim.drain_notifications())?;

    let skipped = commands.len() - next;
    if skipped > 0 {
        warn!(skipped, ticks, "replay_commands_past_end");
    }
    let report = ReplayReport {
        ticks: sim.current_tick(),
        commands_applied: next,
        commands_skipped: skipped,
        notifications: digest.count(),
        final_entity_count: sim.world().entity_count(),
        digest: digest.finish(),
    };
    info!(
        ticks = report.ticks,
        commands = report.commands_applied,
        notifications = report.notifications,
        digest = %report.digest,
        "replay_finished"
    );
    Ok(report)
}
