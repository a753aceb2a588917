//! Raw metric acquisition from the host
//!
//! The sampling cycle reads every value through the [`MetricSource`] trait.
//! [`ProcMetricSource`] implements it for Linux using procfs, sysfs and the
//! `df`/`ps` tools.

mod discovery;
mod procfs;

#[cfg(test)]
mod tests;

pub use discovery::{discover_default_interface, parse_default_route};
pub use procfs::{parse_df_output, parse_meminfo, parse_ps_output, CpuTimes, ProcMetricSource};

use crate::error::SourceError;
use crate::models::{ByteCounters, ProcessCpu};

pub use async_trait::async_trait;

/// Source of instantaneous host metric readings
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Overall CPU utilisation in percent
    async fn cpu_percent(&self) -> Result<u32, SourceError>;

    /// Memory in use in percent
    async fn ram_percent(&self) -> Result<u32, SourceError>;

    /// Space used on the monitored filesystem in percent
    async fn disk_percent(&self) -> Result<u32, SourceError>;

    /// Cumulative received/transmitted byte counters of an interface
    async fn byte_counters(&self, interface: &str) -> Result<ByteCounters, SourceError>;

    /// Processes ordered by descending CPU usage, at most `limit` rows
    async fn top_processes_by_cpu(&self, limit: usize) -> Result<Vec<ProcessCpu>, SourceError>;
}
