//! Bandwidth measurement with the Ookla `speedtest` CLI

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::BandwidthTester;
use crate::error::CalibrationError;

/// Default limit for one speedtest run
pub const DEFAULT_SPEEDTEST_TIMEOUT: Duration = Duration::from_secs(120);

const SPEEDTEST_ARGS: [&str; 3] = ["--accept-license", "--accept-gdpr", "--format=json"];

#[derive(Debug, Deserialize)]
struct SpeedtestReport {
    download: TransferReport,
}

#[derive(Debug, Deserialize)]
struct TransferReport {
    /// Bytes per second
    bandwidth: f64,
}

/// Download bandwidth in Mbit/s from `speedtest --format=json` output
pub fn parse_speedtest_json(output: &str) -> Result<f64, CalibrationError> {
    let report: SpeedtestReport = serde_json::from_str(output.trim())
        .map_err(|e| CalibrationError::Parse(e.to_string()))?;

    let mbps = report.download.bandwidth / (1024.0 * 1024.0) * 8.0;
    if !mbps.is_finite() || mbps <= 0.0 {
        return Err(CalibrationError::Parse(format!(
            "non-positive download bandwidth {}",
            report.download.bandwidth
        )));
    }

    Ok(mbps)
}

/// Runs the `speedtest` binary and reports its download bandwidth
pub struct SpeedtestCli {
    binary: String,
    timeout: Duration,
}

impl SpeedtestCli {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn command_line(&self) -> String {
        format!("{} {}", self.binary, SPEEDTEST_ARGS.join(" "))
    }
}

impl Default for SpeedtestCli {
    fn default() -> Self {
        Self::new("speedtest", DEFAULT_SPEEDTEST_TIMEOUT)
    }
}

#[async_trait]
impl BandwidthTester for SpeedtestCli {
    async fn measure_download_mbps(&self) -> Result<f64, CalibrationError> {
        let run = Command::new(&self.binary)
            .args(SPEEDTEST_ARGS)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| CalibrationError::Timeout(self.timeout))?
            .map_err(|e| CalibrationError::Command {
                command: self.command_line(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(CalibrationError::Command {
                command: self.command_line(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_speedtest_json(&String::from_utf8_lossy(&output.stdout))
    }
}
