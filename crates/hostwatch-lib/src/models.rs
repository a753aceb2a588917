//! Core data models for the host monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four host metrics the monitor samples every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Ram,
    Disk,
    Network,
}

impl MetricKind {
    /// All metrics in reporting order
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Cpu,
        MetricKind::Ram,
        MetricKind::Disk,
        MetricKind::Network,
    ];

    /// Stable index used for per-metric storage
    pub fn index(self) -> usize {
        match self {
            MetricKind::Cpu => 0,
            MetricKind::Ram => 1,
            MetricKind::Disk => 2,
            MetricKind::Network => 3,
        }
    }

    /// Label used in alert text
    pub fn label(self) -> &'static str {
        match self {
            MetricKind::Cpu => "CPU",
            MetricKind::Ram => "RAM",
            MetricKind::Disk => "DISK",
            MetricKind::Network => "NETWORK",
        }
    }

    /// Lowercase identifier used in logs and metric labels
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Ram => "ram",
            MetricKind::Disk => "disk",
            MetricKind::Network => "network",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observation of one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// One tick's reading of all four metrics, in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSample {
    pub cpu_percent: u32,
    pub ram_percent: u32,
    pub disk_percent: u32,
    pub network_percent: u32,
}

impl HostSample {
    pub fn value(&self, kind: MetricKind) -> u32 {
        match kind {
            MetricKind::Cpu => self.cpu_percent,
            MetricKind::Ram => self.ram_percent,
            MetricKind::Disk => self.disk_percent,
            MetricKind::Network => self.network_percent,
        }
    }
}

/// A row of the process table ordered by CPU usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessCpu {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
}

/// Average CPU of one process name across a breach episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessLoad {
    pub name: String,
    pub average_cpu: f64,
}

/// Cumulative interface byte counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ByteCounters {
    pub received: u64,
    pub transmitted: u64,
}

impl ByteCounters {
    /// Bytes moved in both directions since `earlier`, tolerating counter resets
    pub fn delta_since(&self, earlier: &ByteCounters) -> u64 {
        self.received.saturating_sub(earlier.received)
            + self.transmitted.saturating_sub(earlier.transmitted)
    }
}

/// Reference network capacity used to turn throughput into a load percentage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mbps: f64,
    pub refreshed_at: DateTime<Utc>,
    /// True when the value is the configured fallback rather than a measurement
    pub fallback: bool,
}
