//! Sliding-window sample retention
//!
//! Keeps the last 15 minutes of samples per metric and answers
//! windowed-average queries for alert context.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use crate::models::{MetricKind, MetricSample};

/// Retention period for every metric window (15 minutes)
pub const RETENTION_MINUTES: i64 = 15;

/// Windows reported in alerts, in minutes
pub const AVERAGE_WINDOWS: [i64; 3] = [1, 5, 15];

/// Per-metric retention of timestamped samples, capped by age
#[derive(Debug, Clone)]
pub struct SlidingWindowStore {
    retention: Duration,
    windows: [VecDeque<MetricSample>; 4],
}

impl SlidingWindowStore {
    pub fn new() -> Self {
        Self {
            retention: Duration::minutes(RETENTION_MINUTES),
            windows: Default::default(),
        }
    }

    /// Append a sample and purge anything older than the retention period
    pub fn record(&mut self, kind: MetricKind, timestamp: DateTime<Utc>, value: f64) {
        let window = &mut self.windows[kind.index()];
        window.push_back(MetricSample { timestamp, value });

        // Wall-clock timestamps can step backwards, so the deque is not
        // guaranteed to be ordered
        let cutoff = timestamp - self.retention;
        window.retain(|s| s.timestamp >= cutoff);
    }

    /// Mean of the samples whose age is at most `window_minutes`
    ///
    /// Returns 0.0 when no sample qualifies.
    pub fn average(&self, kind: MetricKind, window_minutes: i64, now: DateTime<Utc>) -> f64 {
        let cutoff = now - Duration::minutes(window_minutes.min(RETENTION_MINUTES));
        let (sum, count) = self.windows[kind.index()]
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .fold((0.0, 0usize), |(sum, count), s| (sum + s.value, count + 1));

        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// The 1/5/15-minute averages for one metric
    pub fn averages(&self, kind: MetricKind, now: DateTime<Utc>) -> [f64; 3] {
        AVERAGE_WINDOWS.map(|minutes| self.average(kind, minutes, now))
    }

    /// Retained samples for one metric, oldest first
    pub fn samples(&self, kind: MetricKind) -> impl Iterator<Item = &MetricSample> {
        self.windows[kind.index()].iter()
    }

    pub fn len(&self, kind: MetricKind) -> usize {
        self.windows[kind.index()].len()
    }
}

impl Default for SlidingWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_record_purges_samples_older_than_retention() {
        let mut store = SlidingWindowStore::new();

        // One sample every 3 seconds for 30 minutes
        for i in 0..600 {
            store.record(MetricKind::Cpu, at(i * 3), 50.0);
        }

        let newest = at(599 * 3);
        assert!(store
            .samples(MetricKind::Cpu)
            .all(|s| newest - s.timestamp <= Duration::minutes(15)));
        assert_eq!(store.len(MetricKind::Cpu), 301);
    }

    #[test]
    fn test_record_purges_after_clock_step_back() {
        let mut store = SlidingWindowStore::new();
        store.record(MetricKind::Cpu, at(100), 1.0);
        // Clock stepped back 50 seconds
        store.record(MetricKind::Cpu, at(50), 2.0);
        // Cutoff lands exactly on the first sample, which stays
        store.record(MetricKind::Cpu, at(1000), 3.0);

        let values: Vec<f64> = store.samples(MetricKind::Cpu).map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 3.0]);
    }

    #[test]
    fn test_average_empty_window_is_zero() {
        let store = SlidingWindowStore::new();
        assert_eq!(store.average(MetricKind::Ram, 5, at(0)), 0.0);
    }

    #[test]
    fn test_average_fully_aged_out_is_zero() {
        let mut store = SlidingWindowStore::new();
        store.record(MetricKind::Disk, at(0), 90.0);

        assert_eq!(store.average(MetricKind::Disk, 1, at(120)), 0.0);
    }

    #[test]
    fn test_average_respects_window_length() {
        let mut store = SlidingWindowStore::new();
        store.record(MetricKind::Network, at(0), 10.0);
        store.record(MetricKind::Network, at(240), 20.0);
        store.record(MetricKind::Network, at(290), 30.0);

        let now = at(300);
        assert!((store.average(MetricKind::Network, 1, now) - 25.0).abs() < 1e-9);
        assert!((store.average(MetricKind::Network, 5, now) - 20.0).abs() < 1e-9);
        assert!((store.average(MetricKind::Network, 15, now) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_windows_are_independent_per_metric() {
        let mut store = SlidingWindowStore::new();
        store.record(MetricKind::Cpu, at(0), 95.0);

        assert_eq!(store.len(MetricKind::Cpu), 1);
        assert_eq!(store.len(MetricKind::Ram), 0);
        assert_eq!(store.average(MetricKind::Ram, 15, at(0)), 0.0);
    }

    #[test]
    fn test_sample_exactly_at_window_edge_is_included() {
        let mut store = SlidingWindowStore::new();
        store.record(MetricKind::Cpu, at(0), 40.0);

        assert_eq!(store.average(MetricKind::Cpu, 1, at(60)), 40.0);
    }
}
