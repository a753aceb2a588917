//! Network baseline calibration
//!
//! Measures the link's download capacity, retrying once after a backoff,
//! and falls back to a fixed value (announcing it to recipients) when every
//! attempt fails. The result is published through a watch channel so the
//! sampling cycle always sees a complete baseline, old or new.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::BandwidthTester;
use crate::alert::{AlertComposer, Notifier, PublicAddressResolver};
use crate::health::{components, HealthRegistry};
use crate::models::Baseline;
use crate::observability::{AgentMetrics, StructuredLogger};

/// Default baseline when the bandwidth test cannot be run (Mbit/s)
pub const DEFAULT_FALLBACK_MBPS: f64 = 250.0;

/// Configuration for baseline calibration
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Measurement attempts per calibration (default: 2)
    pub attempts: u32,
    /// Wait between attempts (default: 20 seconds)
    pub backoff: Duration,
    /// Baseline used when every attempt fails (default: 250 Mbit/s)
    pub fallback_mbps: f64,
    /// Interval between recalibrations (default: 4 hours)
    pub interval: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff: Duration::from_secs(20),
            fallback_mbps: DEFAULT_FALLBACK_MBPS,
            interval: Duration::from_secs(4 * 60 * 60),
        }
    }
}

/// Determines and refreshes the network capacity baseline
pub struct BaselineCalibrator {
    tester: Arc<dyn BandwidthTester>,
    resolver: Arc<dyn PublicAddressResolver>,
    notifier: Arc<dyn Notifier>,
    recipients: Vec<String>,
    composer: AlertComposer,
    config: CalibrationConfig,
    metrics: AgentMetrics,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl BaselineCalibrator {
    pub fn new(
        tester: Arc<dyn BandwidthTester>,
        resolver: Arc<dyn PublicAddressResolver>,
        notifier: Arc<dyn Notifier>,
        recipients: Vec<String>,
        config: CalibrationConfig,
    ) -> Self {
        Self {
            tester,
            resolver,
            notifier,
            recipients,
            composer: AlertComposer::default(),
            config,
            metrics: AgentMetrics::new(),
            logger: None,
            health: None,
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Measure the baseline, or fall back to the configured default
    ///
    /// May take several minutes: each attempt runs a full bandwidth test and
    /// failed attempts are separated by the backoff.
    pub async fn calibrate(&self) -> Baseline {
        let attempts = self.config.attempts.max(1);

        for attempt in 1..=attempts {
            match self.tester.measure_download_mbps().await {
                Ok(mbps) => {
                    let baseline = Baseline {
                        mbps,
                        refreshed_at: Utc::now(),
                        fallback: false,
                    };
                    self.report(&baseline).await;
                    return baseline;
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Bandwidth test attempt failed");
                }
            }

            if attempt < attempts {
                info!(
                    backoff_secs = self.config.backoff.as_secs(),
                    "Retrying bandwidth test after backoff"
                );
                sleep(self.config.backoff).await;
            }
        }

        let baseline = Baseline {
            mbps: self.config.fallback_mbps,
            refreshed_at: Utc::now(),
            fallback: true,
        };
        self.report(&baseline).await;
        self.announce_fallback(attempts).await;
        baseline
    }

    /// Tell recipients that load percentages are relative to a default
    async fn announce_fallback(&self, attempts: u32) {
        let address = self.resolver.resolve().await;
        let text = self
            .composer
            .compose_fallback_warning(attempts, self.config.fallback_mbps, &address);

        let reports = self.notifier.send(&self.recipients, &text).await;
        let failed = reports.iter().filter(|r| !r.delivered()).count();
        if failed > 0 {
            self.metrics.inc_delivery_failures(failed as u64);
            warn!(
                failed,
                recipients = reports.len(),
                "Fallback baseline warning not delivered to every recipient"
            );
        }
    }

    async fn report(&self, baseline: &Baseline) {
        self.metrics.set_baseline(baseline.mbps);
        if let Some(logger) = &self.logger {
            logger.log_calibration(baseline.mbps, baseline.fallback);
        }

        if baseline.fallback {
            self.metrics.inc_calibration_fallbacks();
            warn!(mbps = baseline.mbps, "Using fallback network baseline");
        } else {
            info!(mbps = format!("{:.2}", baseline.mbps), "Network baseline measured");
        }

        if let Some(health) = &self.health {
            if baseline.fallback {
                health
                    .set_degraded(components::CALIBRATOR, "Using fallback network baseline")
                    .await;
            } else {
                health.set_healthy(components::CALIBRATOR).await;
            }
        }
    }

    /// Recalibrate on every interval until shutdown
    ///
    /// The first recalibration happens one interval from now; the startup
    /// calibration is expected to have been published already.
    pub async fn run(
        self,
        baseline_tx: watch::Sender<Option<Baseline>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting baseline recalibration loop"
        );

        let mut ticker = interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let baseline = self.calibrate().await;
                    baseline_tx.send_replace(Some(baseline));
                }
                _ = shutdown.recv() => {
                    info!("Shutting down baseline recalibration loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::DeliveryReport;
    use crate::error::CalibrationError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Tester replaying a scripted sequence of outcomes
    struct ScriptedTester {
        outcomes: Mutex<VecDeque<Result<f64, CalibrationError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedTester {
        fn new(outcomes: Vec<Result<f64, CalibrationError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl BandwidthTester for ScriptedTester {
        async fn measure_download_mbps(&self) -> Result<f64, CalibrationError> {
            *self.calls.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CalibrationError::Parse("script exhausted".into())))
        }
    }

    struct FixedResolver;

    #[async_trait]
    impl PublicAddressResolver for FixedResolver {
        async fn resolve(&self) -> String {
            "192.0.2.10".to_string()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(Vec<String>, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, recipients: &[String], text: &str) -> Vec<DeliveryReport> {
            self.sent
                .lock()
                .unwrap()
                .push((recipients.to_vec(), text.to_string()));
            recipients
                .iter()
                .map(|r| DeliveryReport {
                    recipient: r.clone(),
                    result: Ok(()),
                })
                .collect()
        }
    }

    fn failure() -> Result<f64, CalibrationError> {
        Err(CalibrationError::Timeout(Duration::from_secs(120)))
    }

    fn calibrator(
        tester: Arc<ScriptedTester>,
        notifier: Arc<RecordingNotifier>,
    ) -> BaselineCalibrator {
        BaselineCalibrator::new(
            tester,
            Arc::new(FixedResolver),
            notifier,
            vec!["42".to_string()],
            CalibrationConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_fall_back_and_warn_once() {
        let tester = Arc::new(ScriptedTester::new(vec![failure(), failure()]));
        let notifier = Arc::new(RecordingNotifier::default());

        let baseline = calibrator(tester.clone(), notifier.clone()).calibrate().await;

        assert_eq!(baseline.mbps, DEFAULT_FALLBACK_MBPS);
        assert!(baseline.fallback);
        assert_eq!(tester.calls(), 2);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, vec!["42".to_string()]);
        assert!(sent[0].1.contains("250 Mbit/s"));
        assert!(sent[0].1.contains("192.0.2.10"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_second_attempt_sends_no_warning() {
        let tester = Arc::new(ScriptedTester::new(vec![failure(), Ok(480.5)]));
        let notifier = Arc::new(RecordingNotifier::default());

        let started = Instant::now();
        let baseline = calibrator(tester.clone(), notifier.clone()).calibrate().await;

        assert_eq!(baseline.mbps, 480.5);
        assert!(!baseline.fallback);
        assert_eq!(tester.calls(), 2);
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_skips_backoff() {
        let tester = Arc::new(ScriptedTester::new(vec![Ok(940.0)]));
        let notifier = Arc::new(RecordingNotifier::default());

        let started = Instant::now();
        let baseline = calibrator(tester.clone(), notifier).calibrate().await;

        assert_eq!(baseline.mbps, 940.0);
        assert_eq!(tester.calls(), 1);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_marks_calibrator_degraded() {
        let tester = Arc::new(ScriptedTester::new(vec![failure(), failure()]));
        let notifier = Arc::new(RecordingNotifier::default());
        let health = HealthRegistry::new();
        health.register(components::CALIBRATOR).await;

        calibrator(tester, notifier)
            .with_health(health.clone())
            .calibrate()
            .await;

        let status = health.health().await.components[components::CALIBRATOR].status;
        assert_eq!(status, crate::health::ComponentStatus::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_publishes_recalibration() {
        let tester = Arc::new(ScriptedTester::new(vec![Ok(100.0)]));
        let notifier = Arc::new(RecordingNotifier::default());
        let (baseline_tx, mut baseline_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let calibrator = BaselineCalibrator::new(
            tester,
            Arc::new(FixedResolver),
            notifier,
            vec!["42".to_string()],
            CalibrationConfig {
                interval: Duration::from_secs(60),
                ..CalibrationConfig::default()
            },
        );
        let handle = tokio::spawn(calibrator.run(baseline_tx, shutdown_rx));

        baseline_rx.changed().await.unwrap();
        let baseline = baseline_rx.borrow().expect("baseline published");
        assert_eq!(baseline.mbps, 100.0);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
