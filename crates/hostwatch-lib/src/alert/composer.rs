//! Alert text rendering
//!
//! Turns a [`NotificationSnapshot`] into the message body delivered to
//! recipients. Rendering is pure: the same snapshot always yields the same
//! text.

use std::fmt::Write;

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::engine::MetricLimits;
use crate::models::{Baseline, HostSample, MetricKind, ProcessLoad};

const OVER_GLYPH: &str = "🔴";
const UNDER_GLYPH: &str = "🟢";

/// Moscow time, UTC+03:00 with no daylight saving
const MSK_OFFSET_SECS: i32 = 3 * 60 * 60;

/// Everything an alert reports, assembled at the moment of emission
#[derive(Debug, Clone)]
pub struct NotificationSnapshot {
    pub public_address: String,
    pub sample: HostSample,
    pub limits: MetricLimits,
    /// CPU averages over 1, 5 and 15 minutes
    pub cpu_averages: [f64; 3],
    /// Network load averages over 1, 5 and 15 minutes
    pub network_averages: [f64; 3],
    /// Present when CPU was over threshold at emission time
    pub processes: Option<Vec<ProcessLoad>>,
    pub baseline: Option<Baseline>,
    pub timestamp: DateTime<Utc>,
}

impl NotificationSnapshot {
    pub fn is_over(&self, kind: MetricKind) -> bool {
        self.sample.value(kind) > self.limits.get(kind).threshold
    }
}

/// Renders notifications with timestamps in a fixed named time zone
#[derive(Debug, Clone)]
pub struct AlertComposer {
    offset: FixedOffset,
    zone_label: String,
}

impl AlertComposer {
    pub fn new(offset: FixedOffset, zone_label: impl Into<String>) -> Self {
        Self {
            offset,
            zone_label: zone_label.into(),
        }
    }

    /// Render a high-load alert
    pub fn compose(&self, snapshot: &NotificationSnapshot) -> String {
        let mut text = format!("🆘 High load Server IP: {} 🆘\n\n", snapshot.public_address);

        for kind in MetricKind::ALL {
            let glyph = if snapshot.is_over(kind) {
                OVER_GLYPH
            } else {
                UNDER_GLYPH
            };
            let _ = write!(
                text,
                "{} {}: {}%",
                glyph,
                kind.label(),
                snapshot.sample.value(kind)
            );

            match kind {
                MetricKind::Cpu => {
                    let _ = write!(text, " Avg: {}", format_averages(&snapshot.cpu_averages));
                }
                MetricKind::Network => {
                    let _ = write!(
                        text,
                        " Avg: {} Max: {}",
                        format_averages(&snapshot.network_averages),
                        format_baseline(snapshot.baseline.as_ref())
                    );
                }
                MetricKind::Ram | MetricKind::Disk => {}
            }
            text.push('\n');
        }
        text.push('\n');

        if let Some(processes) = &snapshot.processes {
            text.push_str(&format_process_summary(processes));
            text.push('\n');
        }

        let _ = write!(
            text,
            "🕒 Notification time: {}",
            self.format_timestamp(snapshot.timestamp)
        );
        text
    }

    /// Render the one-off warning sent when calibration fell back to a default
    pub fn compose_fallback_warning(
        &self,
        attempts: u32,
        fallback_mbps: f64,
        public_address: &str,
    ) -> String {
        format!(
            "⚠️ Failed to determine maximum download speed after {} attempts. \
             Using default value: {} Mbit/s. Server IP: {}",
            attempts, fallback_mbps, public_address
        )
    }

    pub fn format_timestamp(&self, timestamp: DateTime<Utc>) -> String {
        format!(
            "{} {}",
            timestamp.with_timezone(&self.offset).format("%Y-%m-%d %H:%M:%S"),
            self.zone_label
        )
    }
}

impl Default for AlertComposer {
    fn default() -> Self {
        let offset = FixedOffset::east_opt(MSK_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
        Self::new(offset, "MSK")
    }
}

fn format_averages(averages: &[f64; 3]) -> String {
    format!("{:.1}%, {:.1}%, {:.1}%", averages[0], averages[1], averages[2])
}

fn format_baseline(baseline: Option<&Baseline>) -> String {
    match baseline {
        Some(b) => format!("{:.1} Mbit/s", b.mbps),
        None => "n/a".to_string(),
    }
}

/// The `Top load processes:` block, one line per process
pub fn format_process_summary(processes: &[ProcessLoad]) -> String {
    let mut block = String::from("Top load processes:\n\n");
    for process in processes {
        let _ = writeln!(block, "CMD: {} CPU: {:.1}%", process.name, process.average_cpu);
    }
    block
}
