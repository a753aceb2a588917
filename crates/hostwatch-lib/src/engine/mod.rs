//! Sampling, aggregation and debounce engine
//!
//! This module owns the per-tick state of the monitor: the 15-minute sample
//! windows, the per-metric exceedance streaks, and the top-process
//! accumulation used while CPU is under pressure.

mod cycle;
mod exceedance;
mod processes;
mod window;


pub use cycle::{network_load_percent, SamplingCycle, SamplingCycleBuilder, TickOutcome};
pub use exceedance::{Evaluation, ExceedanceReport, ExceedanceState, ExceedanceTracker};
pub use processes::{ProcessLoadAccumulator, DEFAULT_TOP_PROCESS_LIMIT};
pub use window::{SlidingWindowStore, AVERAGE_WINDOWS, RETENTION_MINUTES};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::MetricKind;

/// Default breach threshold for every metric, in percent
pub const DEFAULT_THRESHOLD: u32 = 80;

/// Default trigger streak for fast-alerting metrics (CPU, network)
pub const DEFAULT_SHORT_STREAK: u32 = 5;

/// Default trigger streak for noisy metrics (RAM, disk)
pub const DEFAULT_LONG_STREAK: u32 = 20;

/// Threshold and trigger streak for one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricLimit {
    pub threshold: u32,
    pub trigger_streak: u32,
}

impl MetricLimit {
    pub fn new(threshold: u32, trigger_streak: u32) -> Self {
        Self {
            threshold,
            trigger_streak,
        }
    }
}

/// Independently tunable limits for all four metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricLimits {
    pub cpu: MetricLimit,
    pub ram: MetricLimit,
    pub disk: MetricLimit,
    pub network: MetricLimit,
}

impl MetricLimits {
    pub fn get(&self, kind: MetricKind) -> MetricLimit {
        match kind {
            MetricKind::Cpu => self.cpu,
            MetricKind::Ram => self.ram,
            MetricKind::Disk => self.disk,
            MetricKind::Network => self.network,
        }
    }
}

impl Default for MetricLimits {
    fn default() -> Self {
        Self {
            cpu: MetricLimit::new(DEFAULT_THRESHOLD, DEFAULT_SHORT_STREAK),
            ram: MetricLimit::new(DEFAULT_THRESHOLD, DEFAULT_LONG_STREAK),
            disk: MetricLimit::new(DEFAULT_THRESHOLD, DEFAULT_LONG_STREAK),
            network: MetricLimit::new(DEFAULT_THRESHOLD, DEFAULT_SHORT_STREAK),
        }
    }
}

/// Configuration for the sampling cycle
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between sampling ticks (default: 3 seconds)
    pub sample_interval: Duration,
    /// Wait between the two byte-counter reads of a tick (default: 1 second)
    pub network_sample_window: Duration,
    /// Process-table rows registered per over-threshold tick (default: 3)
    pub top_process_limit: usize,
    /// Per-metric thresholds and trigger streaks
    pub limits: MetricLimits,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(3),
            network_sample_window: Duration::from_secs(1),
            top_process_limit: DEFAULT_TOP_PROCESS_LIMIT,
            limits: MetricLimits::default(),
        }
    }
}
