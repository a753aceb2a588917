//! Per-tick sampling orchestration
//!
//! Each tick reads all four metrics, feeds the windows and trackers, and
//! emits at most one alert. A tick is a complete transaction: if any read
//! fails nothing is recorded and the next tick starts from the same state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{
    ExceedanceReport, ExceedanceState, MonitorConfig, ProcessLoadAccumulator, SlidingWindowStore,
};
use crate::alert::{AlertComposer, NotificationSnapshot, Notifier, PublicAddressResolver};
use crate::collector::MetricSource;
use crate::error::SourceError;
use crate::health::{components, HealthRegistry, SAMPLER_UNHEALTHY_AFTER};
use crate::models::{Baseline, HostSample, MetricKind};
use crate::observability::{AgentMetrics, StructuredLogger};

/// Network load in percent of the baseline for `bytes` moved over `elapsed`
///
/// Returns 0 when there is no usable baseline or no elapsed time, and never
/// more than 100.
pub fn network_load_percent(bytes: u64, elapsed: Duration, baseline: Option<&Baseline>) -> u32 {
    let secs = elapsed.as_secs_f64();
    let capacity = match baseline {
        Some(b) if b.mbps.is_finite() && b.mbps > 0.0 => b.mbps,
        _ => return 0,
    };
    if secs <= 0.0 {
        return 0;
    }

    let mbps = bytes as f64 * 8.0 / (1024.0 * 1024.0) / secs;
    (mbps / capacity * 100.0).clamp(0.0, 100.0).round() as u32
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A metric read failed; nothing was recorded
    Skipped,
    /// Readings recorded, no tracker crossed
    Quiet,
    /// An alert was emitted for the listed metrics and all streaks were reset
    Alerted {
        triggered: Vec<MetricKind>,
        delivered: usize,
    },
}

/// The sampling task: sole owner of windows, trackers and process accumulation
pub struct SamplingCycle {
    source: Arc<dyn MetricSource>,
    notifier: Arc<dyn Notifier>,
    resolver: Arc<dyn PublicAddressResolver>,
    baseline: watch::Receiver<Option<Baseline>>,
    recipients: Vec<String>,
    interface: String,
    config: MonitorConfig,
    composer: AlertComposer,
    windows: SlidingWindowStore,
    exceedance: ExceedanceState,
    processes: ProcessLoadAccumulator,
    metrics: AgentMetrics,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl SamplingCycle {
    pub fn new(
        source: Arc<dyn MetricSource>,
        notifier: Arc<dyn Notifier>,
        resolver: Arc<dyn PublicAddressResolver>,
        baseline: watch::Receiver<Option<Baseline>>,
        recipients: Vec<String>,
        interface: impl Into<String>,
        config: MonitorConfig,
    ) -> Self {
        let exceedance = ExceedanceState::new(&config.limits);
        Self {
            source,
            notifier,
            resolver,
            baseline,
            recipients,
            interface: interface.into(),
            config,
            composer: AlertComposer::default(),
            windows: SlidingWindowStore::new(),
            exceedance,
            processes: ProcessLoadAccumulator::new(),
            metrics: AgentMetrics::new(),
            logger: None,
            health: None,
        }
    }

    pub fn windows(&self) -> &SlidingWindowStore {
        &self.windows
    }

    pub fn exceedance(&self) -> &ExceedanceState {
        &self.exceedance
    }

    pub fn processes(&self) -> &ProcessLoadAccumulator {
        &self.processes
    }

    /// Run ticks until shutdown; a slow tick delays the next one
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.sample_interval.as_secs(),
            interface = %self.interface,
            "Starting sampling loop"
        );

        let mut ticker = interval(self.config.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick_count = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let outcome = self.tick().await;
                    let elapsed = start.elapsed();

                    tick_count += 1;
                    self.metrics.observe_tick_latency(elapsed.as_secs_f64());

                    // Roughly once a minute at the default interval
                    if tick_count % 20 == 0 {
                        debug!(
                            ticks = tick_count,
                            elapsed_ms = elapsed.as_millis(),
                            outcome = ?outcome,
                            "Sampling cycle complete"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down sampling loop");
                    break;
                }
            }
        }
    }

    /// One full sampling tick
    pub async fn tick(&mut self) -> TickOutcome {
        let sample = match self.acquire().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "Metric read failed, skipping tick");
                self.metrics.inc_ticks_skipped();
                if let Some(health) = &self.health {
                    health
                        .record_failure(components::SAMPLER, e.to_string(), SAMPLER_UNHEALTHY_AFTER)
                        .await;
                }
                return TickOutcome::Skipped;
            }
        };

        if let Some(health) = &self.health {
            health.set_healthy(components::SAMPLER).await;
        }

        let now = Utc::now();
        let report = self.record(&sample, now);
        self.collect_processes(report.cpu_streak_active()).await;

        if !report.notification_needed() {
            return TickOutcome::Quiet;
        }

        let delivered = self.emit(&sample, &report, now).await;
        TickOutcome::Alerted {
            triggered: report.crossed,
            delivered,
        }
    }

    /// Read the four metrics; network load spans the sample window
    async fn acquire(&self) -> Result<HostSample, SourceError> {
        let cpu_percent = self.source.cpu_percent().await?;
        let ram_percent = self.source.ram_percent().await?;
        let disk_percent = self.source.disk_percent().await?;

        let before = self.source.byte_counters(&self.interface).await?;
        let started = Instant::now();
        sleep(self.config.network_sample_window).await;
        let after = self.source.byte_counters(&self.interface).await?;
        let elapsed = started.elapsed();

        let baseline = *self.baseline.borrow();
        let network_percent =
            network_load_percent(after.delta_since(&before), elapsed, baseline.as_ref());

        Ok(HostSample {
            cpu_percent,
            ram_percent,
            disk_percent,
            network_percent,
        })
    }

    /// Feed one sample into the windows and trackers
    pub fn record(&mut self, sample: &HostSample, now: DateTime<Utc>) -> ExceedanceReport {
        for kind in MetricKind::ALL {
            self.windows
                .record(kind, now, f64::from(sample.value(kind)));
        }

        let report = self.exceedance.evaluate(sample);

        self.metrics.set_sample(sample);
        for kind in MetricKind::ALL {
            self.metrics.set_streak(kind, report.streak(kind));
        }

        report
    }

    /// Register the current top processes while CPU is in a breach
    ///
    /// A failed process listing loses this tick's rows only.
    pub async fn collect_processes(&mut self, cpu_streak_active: bool) {
        if !cpu_streak_active {
            return;
        }

        let limit = self.config.top_process_limit;
        match self.source.top_processes_by_cpu(limit).await {
            Ok(top) => self.processes.register(&top, limit),
            Err(e) => warn!(error = %e, "Failed to list top processes"),
        }
    }

    /// Compose and deliver an alert, then reset every streak and the process record
    async fn emit(
        &mut self,
        sample: &HostSample,
        report: &ExceedanceReport,
        now: DateTime<Utc>,
    ) -> usize {
        let processes = if self.exceedance.is_over(MetricKind::Cpu, sample.cpu_percent) {
            Some(self.processes.summary())
        } else {
            None
        };

        let snapshot = NotificationSnapshot {
            public_address: self.resolver.resolve().await,
            sample: *sample,
            limits: self.config.limits,
            cpu_averages: self.windows.averages(MetricKind::Cpu, now),
            network_averages: self.windows.averages(MetricKind::Network, now),
            processes,
            baseline: *self.baseline.borrow(),
            timestamp: now,
        };
        let text = self.composer.compose(&snapshot);
        info!(body = %text, "Composed alert");

        let reports = self.notifier.send(&self.recipients, &text).await;
        let delivered = reports.iter().filter(|r| r.delivered()).count();
        let failed = reports.len() - delivered;

        self.metrics.inc_alerts_sent();
        if failed > 0 {
            self.metrics.inc_delivery_failures(failed as u64);
        }
        if let Some(health) = &self.health {
            if failed > 0 {
                health
                    .set_degraded(
                        components::NOTIFIER,
                        format!("{} of {} deliveries failed", failed, reports.len()),
                    )
                    .await;
            } else {
                health.set_healthy(components::NOTIFIER).await;
            }
        }
        if let Some(logger) = &self.logger {
            logger.log_alert(&report.crossed, sample, delivered, reports.len());
        }

        self.exceedance.reset_all();
        self.processes.reset();
        for kind in MetricKind::ALL {
            self.metrics.set_streak(kind, 0);
        }

        delivered
    }
}

/// Builder for the sampling cycle
pub struct SamplingCycleBuilder {
    source: Option<Arc<dyn MetricSource>>,
    notifier: Option<Arc<dyn Notifier>>,
    resolver: Option<Arc<dyn PublicAddressResolver>>,
    baseline: Option<watch::Receiver<Option<Baseline>>>,
    recipients: Vec<String>,
    interface: Option<String>,
    config: MonitorConfig,
    composer: Option<AlertComposer>,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl SamplingCycleBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            notifier: None,
            resolver: None,
            baseline: None,
            recipients: Vec::new(),
            interface: None,
            config: MonitorConfig::default(),
            composer: None,
            logger: None,
            health: None,
        }
    }

    pub fn source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn PublicAddressResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set the receiving end of the calibrated baseline
    pub fn baseline(mut self, baseline: watch::Receiver<Option<Baseline>>) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn recipients(mut self, recipients: Vec<String>) -> Self {
        self.recipients = recipients;
        self
    }

    /// Set the network interface whose counters are sampled
    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn composer(mut self, composer: AlertComposer) -> Self {
        self.composer = Some(composer);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<SamplingCycle> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Metric source is required"))?;
        let notifier = self
            .notifier
            .ok_or_else(|| anyhow::anyhow!("Notifier is required"))?;
        let resolver = self
            .resolver
            .ok_or_else(|| anyhow::anyhow!("Address resolver is required"))?;
        let baseline = self
            .baseline
            .ok_or_else(|| anyhow::anyhow!("Baseline receiver is required"))?;
        let interface = self
            .interface
            .ok_or_else(|| anyhow::anyhow!("Network interface is required"))?;
        if self.recipients.is_empty() {
            anyhow::bail!("At least one recipient is required");
        }

        let mut cycle = SamplingCycle::new(
            source,
            notifier,
            resolver,
            baseline,
            self.recipients,
            interface,
            self.config,
        );
        if let Some(composer) = self.composer {
            cycle.composer = composer;
        }
        cycle.logger = self.logger;
        cycle.health = self.health;

        Ok(cycle)
    }
}

impl Default for SamplingCycleBuilder {
    fn default() -> Self {
        Self::new()
    }
}
