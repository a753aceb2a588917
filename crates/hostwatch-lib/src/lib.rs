//! Host monitoring library
//!
//! This crate provides the core functionality for:
//! - Sampling CPU, memory, disk and network utilisation
//! - Sliding-window averages and debounced exceedance tracking
//! - Top-process accumulation during CPU pressure
//! - Network baseline calibration
//! - Alert composition and delivery
//! - Health checks and observability

pub mod alert;
pub mod api;
pub mod calibration;
pub mod collector;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;

pub use engine::{MetricLimit, MetricLimits, MonitorConfig, SamplingCycle, SamplingCycleBuilder};
pub use error::{CalibrationError, NotifyError, SourceError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
