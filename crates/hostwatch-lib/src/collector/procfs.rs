//! Linux metric source
//!
//! Reads:
//! - /proc/stat for CPU time counters (utilisation is the delta between reads)
//! - /proc/meminfo for memory in use
//! - /sys/class/net/<iface>/statistics for interface byte counters
//!
//! and runs `df -P` for disk usage and `ps` for the process table.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;

use super::MetricSource;
use crate::error::SourceError;
use crate::models::{ByteCounters, ProcessCpu};

/// Aggregate CPU time counters from the first line of /proc/stat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

impl CpuTimes {
    /// Parse the `cpu` summary line of /proc/stat
    pub fn parse(content: &str) -> Result<Self, SourceError> {
        let line = content
            .lines()
            .find(|l| l.starts_with("cpu "))
            .ok_or_else(|| SourceError::parse("/proc/stat", "missing cpu line"))?;

        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .map(|f| f.parse::<u64>())
            .collect::<Result<_, _>>()
            .map_err(|e| SourceError::parse("/proc/stat", e.to_string()))?;

        if fields.len() < 4 {
            return Err(SourceError::parse("/proc/stat", "too few cpu fields"));
        }

        // user nice system idle iowait irq softirq steal; guest time is already
        // folded into user/nice
        let total = fields.iter().take(8).sum();
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);

        Ok(Self { idle, total })
    }

    /// Busy percentage between `earlier` and `self`
    pub fn busy_percent_since(&self, earlier: &CpuTimes) -> u32 {
        let total = self.total.saturating_sub(earlier.total);
        if total == 0 {
            return 0;
        }
        let idle = self.idle.saturating_sub(earlier.idle).min(total);
        ((total - idle) as f64 / total as f64 * 100.0).round() as u32
    }
}

/// Memory in use (total minus available) as a percentage of total
pub fn parse_meminfo(content: &str) -> Result<u32, SourceError> {
    let mut total = None;
    let mut available = None;
    let mut free_estimate = 0u64;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let value: u64 = match parts[1].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        match parts[0] {
            "MemTotal:" => total = Some(value),
            "MemAvailable:" => available = Some(value),
            "MemFree:" | "Buffers:" | "Cached:" => free_estimate += value,
            _ => {}
        }
    }

    let total = total
        .filter(|t| *t > 0)
        .ok_or_else(|| SourceError::parse("/proc/meminfo", "missing MemTotal"))?;
    // Kernels before 3.14 have no MemAvailable
    let available = available.unwrap_or(free_estimate).min(total);

    Ok(((total - available) as f64 / total as f64 * 100.0).round() as u32)
}

/// Use% column of `df -P` output for the first filesystem row
pub fn parse_df_output(output: &str) -> Result<u32, SourceError> {
    let row = output
        .lines()
        .nth(1)
        .ok_or_else(|| SourceError::parse("df output", "missing filesystem row"))?;

    let capacity = row
        .split_whitespace()
        .nth(4)
        .ok_or_else(|| SourceError::parse("df output", row.to_string()))?;

    capacity
        .trim_end_matches('%')
        .parse()
        .map_err(|_| SourceError::parse("df output", capacity.to_string()))
}

/// Rows of `ps -eo pid,comm,%cpu --sort=-%cpu`, header skipped
///
/// Rows whose pid or CPU column does not parse are dropped.
pub fn parse_ps_output(output: &str, limit: usize) -> Vec<ProcessCpu> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                return None;
            }
            let pid = parts[0].parse().ok()?;
            let cpu_percent = parts[parts.len() - 1].parse().ok()?;
            // comm may contain spaces
            let name = parts[1..parts.len() - 1].join(" ");
            Some(ProcessCpu {
                pid,
                name,
                cpu_percent,
            })
        })
        .take(limit)
        .collect()
}

/// Metric source backed by procfs, sysfs and standard tools
pub struct ProcMetricSource {
    proc_path: PathBuf,
    sys_path: PathBuf,
    disk_mount: PathBuf,
    previous_cpu: Mutex<Option<CpuTimes>>,
}

impl ProcMetricSource {
    /// Create a source reading the live system, reporting disk usage of `disk_mount`
    pub fn new(disk_mount: impl Into<PathBuf>) -> Self {
        Self::with_paths("/proc", "/sys", disk_mount)
    }

    /// Create a source with custom proc/sys roots (for testing)
    pub fn with_paths(
        proc_path: impl Into<PathBuf>,
        sys_path: impl Into<PathBuf>,
        disk_mount: impl Into<PathBuf>,
    ) -> Self {
        Self {
            proc_path: proc_path.into(),
            sys_path: sys_path.into(),
            disk_mount: disk_mount.into(),
            previous_cpu: Mutex::new(None),
        }
    }

    pub fn proc_path(&self) -> &Path {
        &self.proc_path
    }

    async fn read_file(&self, path: PathBuf) -> Result<String, SourceError> {
        fs::read_to_string(&path)
            .await
            .map_err(|source| SourceError::Io { path, source })
    }

    async fn read_counter(&self, interface: &str, name: &str) -> Result<u64, SourceError> {
        let path = self
            .sys_path
            .join("class/net")
            .join(interface)
            .join("statistics")
            .join(name);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SourceError::MissingInterface(interface.to_string()))
            }
            Err(source) => return Err(SourceError::Io { path, source }),
        };

        content
            .trim()
            .parse()
            .map_err(|_| SourceError::parse("interface counter", content.trim().to_string()))
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, SourceError> {
        let command = format!("{} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| SourceError::Command {
                command: command.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(SourceError::Command {
                command,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MetricSource for ProcMetricSource {
    async fn cpu_percent(&self) -> Result<u32, SourceError> {
        let content = self.read_file(self.proc_path.join("stat")).await?;
        let current = CpuTimes::parse(&content)?;

        let mut previous = self
            .previous_cpu
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // First read measures since boot
        let earlier = previous.unwrap_or_default();
        *previous = Some(current);

        Ok(current.busy_percent_since(&earlier))
    }

    async fn ram_percent(&self) -> Result<u32, SourceError> {
        let content = self.read_file(self.proc_path.join("meminfo")).await?;
        parse_meminfo(&content)
    }

    async fn disk_percent(&self) -> Result<u32, SourceError> {
        let mount = self.disk_mount.to_string_lossy().into_owned();
        let output = self.run("df", &["-P", &mount]).await?;
        parse_df_output(&output)
    }

    async fn byte_counters(&self, interface: &str) -> Result<ByteCounters, SourceError> {
        Ok(ByteCounters {
            received: self.read_counter(interface, "rx_bytes").await?,
            transmitted: self.read_counter(interface, "tx_bytes").await?,
        })
    }

    async fn top_processes_by_cpu(&self, limit: usize) -> Result<Vec<ProcessCpu>, SourceError> {
        let output = self
            .run("ps", &["-eo", "pid,comm,%cpu", "--sort=-%cpu"])
            .await?;
        Ok(parse_ps_output(&output, limit))
    }
}
