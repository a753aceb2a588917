//! Agent configuration

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use hostwatch_lib::alert::{DEFAULT_PUBLIC_IP_URL, DEFAULT_TELEGRAM_API_URL};
use hostwatch_lib::calibration::{CalibrationConfig, DEFAULT_FALLBACK_MBPS};
use hostwatch_lib::engine::{
    MetricLimit, MetricLimits, MonitorConfig, DEFAULT_LONG_STREAK, DEFAULT_SHORT_STREAK,
    DEFAULT_THRESHOLD, DEFAULT_TOP_PROCESS_LIMIT,
};
use serde::{Deserialize, Deserializer};

/// Prefix of configuration environment variables, e.g. `HOSTWATCH_CPU_THRESHOLD`
pub const ENV_PREFIX: &str = "HOSTWATCH";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Telegram bot token
    #[serde(default)]
    pub telegram_token: String,

    /// Chat ids that receive alerts; a list or a comma-separated string
    #[serde(default, deserialize_with = "deserialize_chat_ids")]
    pub telegram_chat_ids: Vec<String>,

    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,

    /// Plain-text service echoing the caller's public IP
    #[serde(default = "default_public_ip_url")]
    pub public_ip_url: String,

    #[serde(default = "default_threshold")]
    pub cpu_threshold: u32,
    #[serde(default = "default_threshold")]
    pub ram_threshold: u32,
    #[serde(default = "default_threshold")]
    pub disk_threshold: u32,
    #[serde(default = "default_threshold")]
    pub network_threshold: u32,

    #[serde(default = "default_short_streak")]
    pub cpu_trigger_streak: u32,
    #[serde(default = "default_long_streak")]
    pub ram_trigger_streak: u32,
    #[serde(default = "default_long_streak")]
    pub disk_trigger_streak: u32,
    #[serde(default = "default_short_streak")]
    pub network_trigger_streak: u32,

    /// Sampling tick interval in seconds
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    /// Wait between the two interface counter reads in milliseconds
    #[serde(default = "default_network_sample_window")]
    pub network_sample_window_ms: u64,

    /// Baseline recalibration interval in seconds
    #[serde(default = "default_calibration_interval")]
    pub calibration_interval_secs: u64,

    #[serde(default = "default_calibration_attempts")]
    pub calibration_attempts: u32,

    #[serde(default = "default_calibration_backoff")]
    pub calibration_backoff_secs: u64,

    /// Baseline used when the bandwidth test keeps failing, in Mbit/s
    #[serde(default = "default_fallback_baseline")]
    pub fallback_baseline_mbps: f64,

    #[serde(default = "default_speedtest_binary")]
    pub speedtest_binary: String,

    #[serde(default = "default_speedtest_timeout")]
    pub speedtest_timeout_secs: u64,

    /// Mount point whose usage is reported as disk load
    #[serde(default = "default_disk_mount")]
    pub disk_mount: String,

    #[serde(default = "default_top_process_limit")]
    pub top_process_limit: usize,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Host name used in structured logs
    #[serde(default = "default_host_name")]
    pub host_name: String,
}

fn default_telegram_api_url() -> String {
    DEFAULT_TELEGRAM_API_URL.to_string()
}

fn default_public_ip_url() -> String {
    DEFAULT_PUBLIC_IP_URL.to_string()
}

fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD
}

fn default_short_streak() -> u32 {
    DEFAULT_SHORT_STREAK
}

fn default_long_streak() -> u32 {
    DEFAULT_LONG_STREAK
}

fn default_sample_interval() -> u64 {
    3
}

fn default_network_sample_window() -> u64 {
    1000
}

fn default_calibration_interval() -> u64 {
    4 * 60 * 60
}

fn default_calibration_attempts() -> u32 {
    2
}

fn default_calibration_backoff() -> u64 {
    20
}

fn default_fallback_baseline() -> f64 {
    DEFAULT_FALLBACK_MBPS
}

fn default_speedtest_binary() -> String {
    "speedtest".to_string()
}

fn default_speedtest_timeout() -> u64 {
    120
}

fn default_disk_mount() -> String {
    "/".to_string()
}

fn default_top_process_limit() -> usize {
    DEFAULT_TOP_PROCESS_LIMIT
}

fn default_api_port() -> u16 {
    8080
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatIdEntry {
    Text(String),
    Number(i64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatIds {
    List(Vec<ChatIdEntry>),
    Single(ChatIdEntry),
}

fn split_chat_ids(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn deserialize_chat_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match ChatIds::deserialize(deserializer)? {
        ChatIds::List(entries) => entries,
        ChatIds::Single(entry) => vec![entry],
    };

    Ok(entries
        .into_iter()
        .flat_map(|entry| match entry {
            ChatIdEntry::Text(text) => split_chat_ids(&text).collect::<Vec<_>>(),
            ChatIdEntry::Number(id) => vec![id.to_string()],
        })
        .collect())
}

/// Values given on the command line; they win over every other source
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub token: Option<String>,
    /// Comma-separated chat ids
    pub chat_ids: Option<String>,
}

impl AgentConfig {
    /// Load configuration from the optional file, the environment and the command line
    pub fn load(file: Option<&Path>, overrides: CliOverrides) -> Result<Self> {
        Self::load_with_env(file, config::Environment::with_prefix(ENV_PREFIX), overrides)
    }

    fn load_with_env(
        file: Option<&Path>,
        env: config::Environment,
        overrides: CliOverrides,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(env)
            .set_override_option("telegram_token", overrides.token)?
            .set_override_option("telegram_chat_ids", overrides.chat_ids)?
            .build()
            .context("Failed to read configuration")?;

        let agent_config: AgentConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        agent_config.validate()?;

        Ok(agent_config)
    }

    /// Reject configurations the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.telegram_token.trim().is_empty() {
            bail!("Telegram token is required (argument TOKEN or HOSTWATCH_TELEGRAM_TOKEN)");
        }
        if self.telegram_chat_ids.is_empty() {
            bail!("At least one chat id is required (argument CHAT_IDS or HOSTWATCH_TELEGRAM_CHAT_IDS)");
        }

        for (name, streak) in [
            ("cpu_trigger_streak", self.cpu_trigger_streak),
            ("ram_trigger_streak", self.ram_trigger_streak),
            ("disk_trigger_streak", self.disk_trigger_streak),
            ("network_trigger_streak", self.network_trigger_streak),
        ] {
            if streak == 0 {
                bail!("{} must be at least 1", name);
            }
        }

        for (name, value) in [
            ("sample_interval_secs", self.sample_interval_secs),
            ("network_sample_window_ms", self.network_sample_window_ms),
            ("calibration_interval_secs", self.calibration_interval_secs),
            ("speedtest_timeout_secs", self.speedtest_timeout_secs),
        ] {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }

        if self.calibration_attempts == 0 {
            bail!("calibration_attempts must be at least 1");
        }
        if self.fallback_baseline_mbps.is_nan() || self.fallback_baseline_mbps <= 0.0 {
            bail!("fallback_baseline_mbps must be positive");
        }

        Ok(())
    }

    pub fn limits(&self) -> MetricLimits {
        MetricLimits {
            cpu: MetricLimit::new(self.cpu_threshold, self.cpu_trigger_streak),
            ram: MetricLimit::new(self.ram_threshold, self.ram_trigger_streak),
            disk: MetricLimit::new(self.disk_threshold, self.disk_trigger_streak),
            network: MetricLimit::new(self.network_threshold, self.network_trigger_streak),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            sample_interval: Duration::from_secs(self.sample_interval_secs),
            network_sample_window: Duration::from_millis(self.network_sample_window_ms),
            top_process_limit: self.top_process_limit,
            limits: self.limits(),
        }
    }

    pub fn calibration_config(&self) -> CalibrationConfig {
        CalibrationConfig {
            attempts: self.calibration_attempts,
            backoff: Duration::from_secs(self.calibration_backoff_secs),
            fallback_mbps: self.fallback_baseline_mbps,
            interval: Duration::from_secs(self.calibration_interval_secs),
        }
    }

    pub fn speedtest_timeout(&self) -> Duration {
        Duration::from_secs(self.speedtest_timeout_secs)
    }
}
