use std::time::Duration;

use tracing::warn;

use super::SimConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub ticks_to_run: u32,
    pub remaining_accumulator: Duration,
    pub dropped_backlog: Duration,
}

/// Wall-clock accumulator that turns frame deltas into whole simulation ticks.
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_advance: u32,
    accumulator: Duration,
}

impl FixedStepClock {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            fixed_dt: config.update_frequency(),
            max_frame_delta: config.max_frame_delta(),
            max_ticks_per_advance: config.max_ticks_per_advance.max(1),
            accumulator: Duration::ZERO,
        }
    }

    pub fn fixed_dt(&self) -> Duration {
        self.fixed_dt
    }

    /// Feeds one frame delta and returns how many ticks to run now.
    pub fn advance(&mut self, frame_dt: Duration) -> StepPlan {
        let clamped = clamp_frame_delta(frame_dt, self.max_frame_delta);
        let plan = plan_sim_steps(
            self.accumulator.saturating_add(clamped),
            self.fixed_dt,
            self.max_ticks_per_advance,
        );
        self.accumulator = plan.remaining_accumulator;
        if !plan.dropped_backlog.is_zero() {
            warn!(
                dropped_ms = plan.dropped_backlog.as_millis() as u64,
                ticks = plan.ticks_to_run,
                "sim_backlog_dropped"
            );
        }
        plan
    }

    /// Time left until the next tick is due.
    pub fn until_next_tick(&self) -> Duration {
        self.fixed_dt.saturating_sub(self.accumulator)
    }
}

fn plan_sim_steps(mut accumulator: Duration, fixed_dt: Duration, max_ticks: u32) -> StepPlan {
    let mut ticks_to_run = 0u32;
    while accumulator >= fixed_dt && ticks_to_run < max_ticks {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(update_ms: u64, max_ticks: u32, max_frame_ms: u64) -> FixedStepClock {
        FixedStepClock::new(&SimConfig {
            update_frequency_ms: update_ms,
            max_ticks_per_advance: max_ticks,
            max_frame_delta_ms: max_frame_ms,
            ..SimConfig::default()
        })
    }

    #[test]
    fn accumulates_partial_frames_into_ticks() {
        let mut clock = clock(100, 5, 250);
        assert_eq!(clock.advance(Duration::from_millis(60)).ticks_to_run, 0);
        let plan = clock.advance(Duration::from_millis(60));
        assert_eq!(plan.ticks_to_run, 1);
        assert_eq!(plan.remaining_accumulator, Duration::from_millis(20));
        assert_eq!(clock.until_next_tick(), Duration::from_millis(80));
    }

    #[test]
    fn large_frames_are_clamped_before_planning() {
        let mut clock = clock(100, 5, 250);
        let plan = clock.advance(Duration::from_secs(10));
        assert_eq!(plan.ticks_to_run, 2);
        assert_eq!(plan.remaining_accumulator, Duration::from_millis(50));
        assert_eq!(plan.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn backlog_beyond_the_tick_cap_is_dropped() {
        let plan = plan_sim_steps(Duration::from_millis(120), Duration::from_millis(16), 3);
        assert_eq!(plan.ticks_to_run, 3);
        assert_eq!(plan.remaining_accumulator, Duration::ZERO);
        assert_eq!(plan.dropped_backlog, Duration::from_millis(72));
    }
}
