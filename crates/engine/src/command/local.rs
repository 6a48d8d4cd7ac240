use tracing::debug;

use super::{CommandFunnel, Intent, IntentOutcome, Submission};
use crate::replay::CommandLog;
use crate::sim::{SimError, Simulation, TickReport};

/// Authority living in the same process as its caller: every submission is
/// resolved, applied and notified before `submit` returns.
pub struct LocalAuthority {
    sim: Simulation,
    log: Option<CommandLog>,
}

impl LocalAuthority {
    pub fn new(sim: Simulation) -> Self {
        Self { sim, log: None }
    }

    /// Same as `new`, but every resolved intent is also appended to a command log.
    pub fn recording(sim: Simulation) -> Self {
        Self {
            sim,
            log: Some(CommandLog::new()),
        }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    pub fn into_simulation(self) -> Simulation {
        self.sim
    }

    pub fn tick(&mut self) -> Result<TickReport, SimError> {
        let report = self.sim.tick()?;
        if let Some(log) = self.log.as_mut() {
            log.mark_tick(report.tick);
        }
        Ok(report)
    }

    pub fn command_log(&self) -> Option<&CommandLog> {
        self.log.as_ref()
    }

    pub fn take_command_log(&mut self) -> Option<CommandLog> {
        self.log.take()
    }

    /// Resolves ids, applies the intent and records it. Returns the resolved
    /// intent so a server can broadcast exactly what was applied.
    pub(crate) fn apply(&mut self, intent: Intent) -> Result<(Intent, IntentOutcome), SimError> {
        let resolved = self.sim.resolve_ids(intent);
        let tick = self.sim.current_tick();
        let outcome = self.sim.apply_intent(&resolved)?;
        debug!(
            tick,
            intent = resolved.name(),
            applied = outcome.applied(),
            "intent_applied"
        );
        if let Some(log) = self.log.as_mut() {
            log.record(tick, resolved.clone());
        }
        Ok((resolved, outcome))
    }
}

impl CommandFunnel for LocalAuthority {
    fn submit(&mut self, intent: Intent) -> Result<Submission, SimError> {
        let (_, outcome) = self.apply(intent)?;
        Ok(Submission::Applied(outcome))
    }
}
