//! hostwatch - host load monitor
//!
//! Samples CPU, memory, disk and network load every few seconds and sends a
//! Telegram alert when a metric stays over its threshold for a sustained
//! number of ticks.

use anyhow::{Context, Result};
use clap::Parser;
use hostwatch_lib::{
    alert::{HttpAddressResolver, TelegramNotifier},
    api::{self, AppState},
    calibration::{BaselineCalibrator, SpeedtestCli},
    collector::{discover_default_interface, MetricSource, ProcMetricSource},
    engine::SamplingCycleBuilder,
    health::{components, HealthRegistry},
    observability::{AgentMetrics, StructuredLogger},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use config::{AgentConfig, CliOverrides};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Host load monitor with debounced Telegram alerts
#[derive(Parser, Debug)]
#[command(name = "hostwatch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "HOSTWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Telegram bot token
    token: Option<String>,

    /// Comma-separated Telegram chat ids
    chat_ids: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting hostwatch");

    let config = AgentConfig::load(
        args.config.as_deref(),
        CliOverrides {
            token: args.token,
            chat_ids: args.chat_ids,
        },
    )?;
    info!(
        host_name = %config.host_name,
        recipients = config.telegram_chat_ids.len(),
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SAMPLER).await;
    health_registry.register(components::CALIBRATOR).await;
    health_registry.register(components::NOTIFIER).await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.host_name);

    // Without an interface every network reading would be a silent 0%
    let source = Arc::new(ProcMetricSource::new(&config.disk_mount));
    let interface = discover_default_interface(source.proc_path())
        .await
        .context("Failed to discover the default network interface")?;
    source
        .byte_counters(&interface)
        .await
        .with_context(|| format!("Failed to read counters of interface {}", interface))?;
    logger.log_startup(AGENT_VERSION, &interface);

    let notifier = Arc::new(
        TelegramNotifier::with_api_url(&config.telegram_token, &config.telegram_api_url)
            .context("Failed to create Telegram client")?,
    );
    let resolver = Arc::new(
        HttpAddressResolver::new(&config.public_ip_url)
            .context("Failed to create public address client")?,
    );
    let tester = Arc::new(SpeedtestCli::new(
        &config.speedtest_binary,
        config.speedtest_timeout(),
    ));

    // Serve health and metrics while the startup calibration runs
    let app_state = Arc::new(AppState::new(health_registry.clone(), metrics.clone()));
    let api_port = config.api_port;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state).await {
            error!(error = %e, "API server stopped");
        }
    });

    let calibrator = BaselineCalibrator::new(
        tester,
        resolver.clone(),
        notifier.clone(),
        config.telegram_chat_ids.clone(),
        config.calibration_config(),
    )
    .with_logger(logger.clone())
    .with_health(health_registry.clone());

    // Sampling never starts without a baseline
    let baseline = calibrator.calibrate().await;
    let (baseline_tx, baseline_rx) = watch::channel(Some(baseline));

    let sampling = SamplingCycleBuilder::new()
        .source(source)
        .notifier(notifier)
        .resolver(resolver)
        .baseline(baseline_rx)
        .recipients(config.telegram_chat_ids.clone())
        .interface(interface)
        .config(config.monitor_config())
        .logger(logger.clone())
        .health(health_registry.clone())
        .build()?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let calibration_handle = tokio::spawn(calibrator.run(baseline_tx, shutdown_tx.subscribe()));
    let sampling_handle = tokio::spawn(sampling.run(shutdown_tx.subscribe()));

    health_registry.set_ready(true).await;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    let _ = sampling_handle.await;
    // A recalibration in progress is not waited for
    calibration_handle.abort();
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_positional_credentials() {
        let args = Args::try_parse_from(["hostwatch", "123:abc", "1001,1002"]).unwrap();

        assert_eq!(args.token.as_deref(), Some("123:abc"));
        assert_eq!(args.chat_ids.as_deref(), Some("1001,1002"));
    }

    #[test]
    fn test_args_config_file_only() {
        let args =
            Args::try_parse_from(["hostwatch", "--config", "/etc/hostwatch.toml"]).unwrap();

        assert_eq!(args.config, Some(PathBuf::from("/etc/hostwatch.toml")));
        assert!(args.token.is_none());
    }
}
