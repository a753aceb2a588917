//! Observability infrastructure for the host monitor
//!
//! Provides:
//! - Prometheus metrics (tick latency, current values, streaks, baseline, alert counters)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_gauge_vec, Gauge,
    Histogram, IntCounter, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::models::{HostSample, MetricKind};

/// Histogram buckets for tick latency (in seconds); a tick includes the
/// one-second network sampling wait
const TICK_LATENCY_BUCKETS: &[f64] = &[0.5, 0.75, 1.0, 1.1, 1.25, 1.5, 2.0, 3.0, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    tick_latency_seconds: Histogram,
    metric_percent: IntGaugeVec,
    exceedance_streak: IntGaugeVec,
    network_baseline_mbps: Gauge,
    alerts_sent: IntCounter,
    ticks_skipped: IntCounter,
    delivery_failures: IntCounter,
    calibration_fallbacks: IntCounter,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "hostwatch_tick_latency_seconds",
                "Time spent in one sampling tick",
                TICK_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            metric_percent: register_int_gauge_vec!(
                "hostwatch_metric_percent",
                "Most recent reading of each host metric in percent",
                &["metric"]
            )
            .expect("Failed to register metric_percent"),

            exceedance_streak: register_int_gauge_vec!(
                "hostwatch_exceedance_streak",
                "Consecutive over-threshold ticks per metric",
                &["metric"]
            )
            .expect("Failed to register exceedance_streak"),

            network_baseline_mbps: register_gauge!(
                "hostwatch_network_baseline_mbps",
                "Network capacity baseline used for the load percentage"
            )
            .expect("Failed to register network_baseline_mbps"),

            alerts_sent: register_int_counter!(
                "hostwatch_alerts_sent_total",
                "Total number of high-load alerts emitted"
            )
            .expect("Failed to register alerts_sent"),

            ticks_skipped: register_int_counter!(
                "hostwatch_ticks_skipped_total",
                "Total number of ticks skipped after a failed metric read"
            )
            .expect("Failed to register ticks_skipped"),

            delivery_failures: register_int_counter!(
                "hostwatch_delivery_failures_total",
                "Total number of failed per-recipient deliveries"
            )
            .expect("Failed to register delivery_failures"),

            calibration_fallbacks: register_int_counter!(
                "hostwatch_calibration_fallbacks_total",
                "Total number of calibrations that fell back to the default baseline"
            )
            .expect("Failed to register calibration_fallbacks"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }

    /// Publish one tick's readings
    pub fn set_sample(&self, sample: &HostSample) {
        for kind in MetricKind::ALL {
            self.inner()
                .metric_percent
                .with_label_values(&[kind.as_str()])
                .set(i64::from(sample.value(kind)));
        }
    }

    pub fn set_streak(&self, kind: MetricKind, streak: u32) {
        self.inner()
            .exceedance_streak
            .with_label_values(&[kind.as_str()])
            .set(i64::from(streak));
    }

    pub fn set_baseline(&self, mbps: f64) {
        self.inner().network_baseline_mbps.set(mbps);
    }

    pub fn inc_alerts_sent(&self) {
        self.inner().alerts_sent.inc();
    }

    pub fn inc_ticks_skipped(&self) {
        self.inner().ticks_skipped.inc();
    }

    pub fn inc_delivery_failures(&self, count: u64) {
        self.inner().delivery_failures.inc_by(count);
    }

    pub fn inc_calibration_fallbacks(&self) {
        self.inner().calibration_fallbacks.inc();
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted logging for alerts, calibrations,
/// and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    host_name: String,
}

impl StructuredLogger {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
        }
    }

    /// Log an emitted high-load alert
    pub fn log_alert(
        &self,
        triggered: &[MetricKind],
        sample: &HostSample,
        delivered: usize,
        recipients: usize,
    ) {
        let triggered = triggered
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(",");

        warn!(
            event = "alert_emitted",
            host = %self.host_name,
            triggered = %triggered,
            cpu_percent = sample.cpu_percent,
            ram_percent = sample.ram_percent,
            disk_percent = sample.disk_percent,
            network_percent = sample.network_percent,
            delivered = delivered,
            recipients = recipients,
            "High load alert emitted"
        );
    }

    /// Log a completed calibration
    pub fn log_calibration(&self, mbps: f64, fallback: bool) {
        if fallback {
            warn!(
                event = "baseline_calibrated",
                host = %self.host_name,
                mbps = mbps,
                fallback = true,
                "Bandwidth test failed, using fallback network baseline"
            );
        } else {
            info!(
                event = "baseline_calibrated",
                host = %self.host_name,
                mbps = mbps,
                fallback = false,
                "Network baseline calibrated"
            );
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, interface: &str) {
        info!(
            event = "agent_started",
            host = %self.host_name,
            agent_version = %version,
            interface = %interface,
            "Host monitor started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            host = %self.host_name,
            reason = %reason,
            "Host monitor shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_metrics_creation() {
        // Metrics live in the global Prometheus registry; repeated handles share them
        let metrics = AgentMetrics::new();
        let again = AgentMetrics::new();

        metrics.observe_tick_latency(1.02);
        metrics.set_sample(&HostSample {
            cpu_percent: 12,
            ram_percent: 34,
            disk_percent: 56,
            network_percent: 7,
        });
        metrics.set_streak(MetricKind::Cpu, 3);
        again.set_baseline(250.0);
        again.inc_alerts_sent();
        again.inc_delivery_failures(2);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-host");
        assert_eq!(logger.host_name, "test-host");
    }
}
