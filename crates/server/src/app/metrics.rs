use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct HostMetricsSnapshot {
    pub(crate) tps: f32,
    pub(crate) submissions_per_sec: f32,
    pub(crate) notifications_per_sec: f32,
    pub(crate) tick_time_ms: f32,
}

/// Rolling counters for the host loop, reported once per interval.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    ticks: u32,
    submissions: u32,
    notifications: u64,
    tick_time_sum: Duration,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval_start: now,
            interval,
            ticks: 0,
            submissions: 0,
            notifications: 0,
            tick_time_sum: Duration::ZERO,
        }
    }

    pub(crate) fn record_tick(&mut self, tick_time: Duration, notifications: usize) {
        self.ticks = self.ticks.saturating_add(1);
        self.tick_time_sum = self.tick_time_sum.saturating_add(tick_time);
        self.notifications = self.notifications.saturating_add(notifications as u64);
    }

    pub(crate) fn record_submissions(&mut self, count: usize) {
        self.submissions = self
            .submissions
            .saturating_add(u32::try_from(count).unwrap_or(u32::MAX));
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<HostMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let tick_time_ms = if self.ticks == 0 {
            0.0
        } else {
            (self.tick_time_sum.as_secs_f32() / self.ticks as f32) * 1000.0
        };

        let snapshot = HostMetricsSnapshot {
            tps: self.ticks as f32 / elapsed_seconds,
            submissions_per_sec: self.submissions as f32 / elapsed_seconds,
            notifications_per_sec: self.notifications as f32 / elapsed_seconds,
            tick_time_ms,
        };

        self.interval_start = now;
        self.ticks = 0;
        self.submissions = 0;
        self.notifications = 0;
        self.tick_time_sum = Duration::ZERO;

        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_computes_expected_rates() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1), base);
        for _ in 0..10 {
            accumulator.record_tick(Duration::from_millis(2), 3);
        }
        accumulator.record_submissions(4);

        let snapshot = accumulator
            .maybe_snapshot(base + Duration::from_secs(2))
            .expect("snapshot should be emitted");

        assert!((snapshot.tps - 5.0).abs() < 0.05);
        assert!((snapshot.submissions_per_sec - 2.0).abs() < 0.05);
        assert!((snapshot.notifications_per_sec - 15.0).abs() < 0.05);
        assert!((snapshot.tick_time_ms - 2.0).abs() < 0.001);
    }

    #[test]
    fn snapshot_not_emitted_before_interval() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1), base);
        accumulator.record_tick(Duration::from_millis(1), 0);

        assert!(accumulator
            .maybe_snapshot(base + Duration::from_millis(500))
            .is_none());
    }

    #[test]
    fn counters_reset_after_each_snapshot() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1), base);
        accumulator.record_tick(Duration::from_millis(1), 7);
        let first = base + Duration::from_secs(1);
        assert!(accumulator.maybe_snapshot(first).is_some());

        let second = accumulator
            .maybe_snapshot(first + Duration::from_secs(1))
            .expect("second snapshot");
        assert_eq!(second, HostMetricsSnapshot::default());
    }
}
