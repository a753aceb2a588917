//! Consecutive-breach tracking
//!
//! Each metric counts the ticks in a row its value stayed strictly above the
//! configured threshold. A tracker crosses once, on the tick its streak
//! reaches the trigger length; the streak keeps growing afterwards until the
//! whole set is reset together.

use serde::{Deserialize, Serialize};

use super::MetricLimits;
use crate::models::{HostSample, MetricKind};

/// Result of evaluating one tracker against one value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub streak: u32,
    pub crossed: bool,
}

/// Consecutive-breach counter for a single metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceedanceTracker {
    pub threshold: u32,
    pub trigger_streak: u32,
    streak: u32,
}

impl ExceedanceTracker {
    pub fn new(threshold: u32, trigger_streak: u32) -> Self {
        Self {
            threshold,
            trigger_streak,
            streak: 0,
        }
    }

    /// Whether `value` counts as a breach
    pub fn breaches(&self, value: u32) -> bool {
        value > self.threshold
    }

    pub fn evaluate(&mut self, value: u32) -> Evaluation {
        if self.breaches(value) {
            self.streak = self.streak.saturating_add(1);
            Evaluation {
                streak: self.streak,
                crossed: self.streak == self.trigger_streak,
            }
        } else {
            self.streak = 0;
            Evaluation {
                streak: 0,
                crossed: false,
            }
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn reset(&mut self) {
        self.streak = 0;
    }
}

/// Outcome of evaluating all four trackers for one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceedanceReport {
    /// Metrics whose streak reached the trigger length on this tick
    pub crossed: Vec<MetricKind>,
    /// Streaks after this tick, indexed by [`MetricKind::index`]
    pub streaks: [u32; 4],
}

impl ExceedanceReport {
    pub fn notification_needed(&self) -> bool {
        !self.crossed.is_empty()
    }

    pub fn streak(&self, kind: MetricKind) -> u32 {
        self.streaks[kind.index()]
    }

    /// CPU is in an active breach (streak of at least one)
    pub fn cpu_streak_active(&self) -> bool {
        self.streak(MetricKind::Cpu) >= 1
    }
}

/// The four per-metric trackers with their coupled reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceedanceState {
    trackers: [ExceedanceTracker; 4],
}

impl ExceedanceState {
    pub fn new(limits: &MetricLimits) -> Self {
        Self {
            trackers: MetricKind::ALL.map(|kind| {
                let limit = limits.get(kind);
                ExceedanceTracker::new(limit.threshold, limit.trigger_streak)
            }),
        }
    }

    pub fn evaluate(&mut self, sample: &HostSample) -> ExceedanceReport {
        let mut report = ExceedanceReport::default();

        for kind in MetricKind::ALL {
            let evaluation = self.trackers[kind.index()].evaluate(sample.value(kind));
            report.streaks[kind.index()] = evaluation.streak;
            if evaluation.crossed {
                report.crossed.push(kind);
            }
        }

        report
    }

    pub fn tracker(&self, kind: MetricKind) -> &ExceedanceTracker {
        &self.trackers[kind.index()]
    }

    pub fn streak(&self, kind: MetricKind) -> u32 {
        self.tracker(kind).streak()
    }

    /// Whether `value` is over the threshold configured for `kind`
    pub fn is_over(&self, kind: MetricKind, value: u32) -> bool {
        self.tracker(kind).breaches(value)
    }

    /// Zero every streak; one metric's alert silences all of them
    pub fn reset_all(&mut self) {
        for tracker in &mut self.trackers {
            tracker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MetricLimit;

    fn sample(cpu: u32, ram: u32, disk: u32, network: u32) -> HostSample {
        HostSample {
            cpu_percent: cpu,
            ram_percent: ram,
            disk_percent: disk,
            network_percent: network,
        }
    }

    #[test]
    fn test_crossed_only_on_trigger_tick() {
        let mut tracker = ExceedanceTracker::new(80, 5);

        for tick in 1..=4 {
            let evaluation = tracker.evaluate(90);
            assert_eq!(evaluation.streak, tick);
            assert!(!evaluation.crossed);
        }

        let fifth = tracker.evaluate(90);
        assert_eq!(fifth.streak, 5);
        assert!(fifth.crossed);

        // Streak keeps growing with no further crossing until reset
        let sixth = tracker.evaluate(90);
        assert_eq!(sixth.streak, 6);
        assert!(!sixth.crossed);
    }

    #[test]
    fn test_non_breach_resets_streak() {
        let mut tracker = ExceedanceTracker::new(80, 20);
        for _ in 0..15 {
            tracker.evaluate(99);
        }

        let evaluation = tracker.evaluate(10);
        assert_eq!(evaluation, Evaluation { streak: 0, crossed: false });
        assert_eq!(tracker.streak(), 0);
    }

    #[test]
    fn test_threshold_comparison_is_strict() {
        let mut tracker = ExceedanceTracker::new(80, 1);

        assert!(!tracker.evaluate(80).crossed);
        assert_eq!(tracker.streak(), 0);
        assert!(tracker.evaluate(81).crossed);
    }

    #[test]
    fn test_state_reports_crossing_metric() {
        let limits = MetricLimits {
            cpu: MetricLimit::new(80, 2),
            ram: MetricLimit::new(80, 20),
            disk: MetricLimit::new(80, 20),
            network: MetricLimit::new(80, 5),
        };
        let mut state = ExceedanceState::new(&limits);

        let first = state.evaluate(&sample(90, 85, 10, 10));
        assert!(!first.notification_needed());
        assert!(first.cpu_streak_active());

        let second = state.evaluate(&sample(90, 85, 10, 10));
        assert_eq!(second.crossed, vec![MetricKind::Cpu]);
        assert_eq!(second.streak(MetricKind::Ram), 2);
        assert_eq!(second.streak(MetricKind::Disk), 0);
    }

    #[test]
    fn test_reset_all_zeroes_every_streak() {
        let mut state = ExceedanceState::new(&MetricLimits::default());
        for _ in 0..3 {
            state.evaluate(&sample(99, 99, 99, 99));
        }

        state.reset_all();

        for kind in MetricKind::ALL {
            assert_eq!(state.streak(kind), 0);
        }
    }
}
