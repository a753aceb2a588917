//! Network capacity baseline
//!
//! The baseline turns raw interface throughput into a load percentage. It is
//! measured once at startup and refreshed on a long interval.

mod calibrator;
mod speedtest;

pub use calibrator::{BaselineCalibrator, CalibrationConfig, DEFAULT_FALLBACK_MBPS};
pub use speedtest::{parse_speedtest_json, SpeedtestCli, DEFAULT_SPEEDTEST_TIMEOUT};

use async_trait::async_trait;

use crate::error::CalibrationError;

/// Measures the link's download capacity
#[async_trait]
pub trait BandwidthTester: Send + Sync {
    /// Download bandwidth in Mbit/s; may take tens of seconds
    async fn measure_download_mbps(&self) -> Result<f64, CalibrationError>;
}
