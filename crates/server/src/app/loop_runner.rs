use std::thread;
use std::time::{Duration, Instant};

use hexfront_engine::command::{AuthorityServer, LocalAuthority, ReplicaHub};
use hexfront_engine::replay::NotificationDigest;
use hexfront_engine::sim::{FixedStepClock, SimError, Simulation, TickReport};
use tracing::{debug, info};

use super::bootstrap::HostError;
use super::metrics::MetricsAccumulator;

const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(1);
const MAX_IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Something the host loop can pump for submissions and advance one tick.
pub(crate) trait TickDriver {
    /// Applies pending external submissions. Returns how many were applied.
    fn pump(&mut self) -> Result<usize, SimError>;
    fn tick(&mut self) -> Result<TickReport, SimError>;
    fn simulation(&self) -> &Simulation;
    fn simulation_mut(&mut self) -> &mut Simulation;
}

impl TickDriver for LocalAuthority {
    fn pump(&mut self) -> Result<usize, SimError> {
        Ok(0)
    }

    fn tick(&mut self) -> Result<TickReport, SimError> {
        LocalAuthority::tick(self)
    }

    fn simulation(&self) -> &Simulation {
        LocalAuthority::simulation(self)
    }

    fn simulation_mut(&mut self) -> &mut Simulation {
        LocalAuthority::simulation_mut(self)
    }
}

impl<H: ReplicaHub> TickDriver for AuthorityServer<H> {
    fn pump(&mut self) -> Result<usize, SimError> {
        AuthorityServer::pump(self)
    }

    fn tick(&mut self) -> Result<TickReport, SimError> {
        AuthorityServer::tick(self)
    }

    fn simulation(&self) -> &Simulation {
        self.authority().simulation()
    }

    fn simulation_mut(&mut self) -> &mut Simulation {
        self.authority_mut().simulation_mut()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoopSummary {
    pub(crate) ticks: u64,
    pub(crate) notifications: u64,
    pub(crate) entity_count: usize,
    pub(crate) digest: String,
}

/// Runs the driver in real time until `max_ticks` is reached, or forever.
pub(crate) fn run_realtime<D: TickDriver>(
    driver: &mut D,
    max_ticks: Option<u64>,
) -> Result<LoopSummary, HostError> {
    let mut clock = FixedStepClock::new(driver.simulation().config());
    let mut last_frame = Instant::now();
    let mut metrics = MetricsAccumulator::new(METRICS_LOG_INTERVAL, last_frame);
    let mut digest = NotificationDigest::new();

    info!(
        tick_ms = clock.fixed_dt().as_millis() as u64,
        max_ticks = ?max_ticks,
        "host_loop_started"
    );

    loop {
        metrics.record_submissions(driver.pump()?);
        if limit_reached(driver.simulation().current_tick(), max_ticks) {
            break;
        }

        let now = Instant::now();
        let plan = clock.advance(now.saturating_duration_since(last_frame));
        last_frame = now;
        for _ in 0..plan.ticks_to_run {
            if limit_reached(driver.simulation().current_tick(), max_ticks) {
                break;
            }
            step(driver, &mut digest, &mut metrics)?;
        }

        if let Some(snapshot) = metrics.maybe_snapshot(Instant::now()) {
            info!(
                tps = snapshot.tps,
                submissions_per_sec = snapshot.submissions_per_sec,
                notifications_per_sec = snapshot.notifications_per_sec,
                tick_time_ms = snapshot.tick_time_ms,
                tick = driver.simulation().current_tick(),
                entity_count = driver.simulation().world().entity_count(),
                "host_metrics"
            );
        }
        thread::sleep(clock.until_next_tick().min(MAX_IDLE_SLEEP));
    }

    finish(driver, digest)
}

/// Runs `ticks` ticks back to back with no pacing.
pub(crate) fn run_headless<D: TickDriver>(
    driver: &mut D,
    ticks: u64,
) -> Result<LoopSummary, HostError> {
    let mut metrics = MetricsAccumulator::new(METRICS_LOG_INTERVAL, Instant::now());
    let mut digest = NotificationDigest::new();
    while driver.simulation().current_tick() < ticks {
        metrics.record_submissions(driver.pump()?);
        step(driver, &mut digest, &mut metrics)?;
    }
    driver.pump()?;
    finish(driver, digest)
}

fn step<D: TickDriver>(
    driver: &mut D,
    digest: &mut NotificationDigest,
    metrics: &mut MetricsAccumulator,
) -> Result<(), HostError> {
    let started = Instant::now();
    let report = driver.tick()?;
    let notifications = driver.simulation_mut().drain_notifications();
    digest.absorb(&notifications)?;
    metrics.record_tick(started.elapsed(), notifications.len());
    if report.kills > 0 || report.entities_removed > 0 {
        debug!(
            tick = report.tick,
            kills = report.kills,
            removed = report.entities_removed,
            "host_tick_casualties"
        );
    }
    Ok(())
}

fn finish<D: TickDriver>(
    driver: &mut D,
    mut digest: NotificationDigest,
) -> Result<LoopSummary, HostError> {
    digest.absorb(&driver.simulation_mut().drain_notifications())?;
    let summary = LoopSummary {
        ticks: driver.simulation().current_tick(),
        notifications: digest.count(),
        entity_count: driver.simulation().world().entity_count(),
        digest: digest.finish(),
    };
    info!(
        ticks = summary.ticks,
        notifications = summary.notifications,
        entity_count = summary.entity_count,
        digest = %summary.digest,
        "host_finished"
    );
    Ok(summary)
}

fn limit_reached(tick: u64, max_ticks: Option<u64>) -> bool {
    max_ticks.is_some_and(|max| tick >= max)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hexfront_engine::ability::AbilityCatalog;
    use hexfront_engine::replay::replay;
    use hexfront_engine::sim::SimConfig;

    use super::*;
    use crate::app::scenario::{build_terrain, stage, ScenarioConfig};

    fn recording_authority(sim_config: SimConfig, scenario: &ScenarioConfig) -> LocalAuthority {
        LocalAuthority::recording(Simulation::new(
            sim_config,
            Arc::new(build_terrain(scenario)),
            Arc::new(AbilityCatalog::standard()),
        ))
    }

    #[test]
    fn limit_only_applies_when_set() {
        assert!(!limit_reached(1_000, None));
        assert!(!limit_reached(4, Some(5)));
        assert!(limit_reached(5, Some(5)));
    }

    #[test]
    fn headless_run_matches_its_replay() {
        let scenario = ScenarioConfig::default();
        let mut authority = recording_authority(SimConfig::default(), &scenario);
        stage(&mut authority, &scenario).expect("stage");
        let summary = run_headless(&mut authority, 30).expect("run");
        assert_eq!(summary.ticks, 30);

        let log = authority.take_command_log().expect("recording");
        assert_eq!(log.final_tick(), 30);
        let report = replay(
            SimConfig::default(),
            Arc::new(build_terrain(&scenario)),
            Arc::new(AbilityCatalog::standard()),
            &log,
            log.final_tick(),
        )
        .expect("replay");
        assert_eq!(report.digest, summary.digest);
        assert_eq!(report.notifications, summary.notifications);
        assert_eq!(report.final_entity_count, summary.entity_count);
    }

    #[test]
    fn realtime_run_stops_at_the_tick_limit() {
        let scenario = ScenarioConfig {
            soldiers_per_team: 1,
            ..ScenarioConfig::default()
        };
        let sim_config = SimConfig {
            update_frequency_ms: 1,
            ..SimConfig::default()
        };
        let mut authority = recording_authority(sim_config, &scenario);
        stage(&mut authority, &scenario).expect("stage");
        let summary = run_realtime(&mut authority, Some(5)).expect("run");
        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.digest.len(), 64);
    }
}
