//! Health tracking for the monitor's moving parts
//!
//! The sampler, calibrator and notifier each report their state here;
//! `/healthz` and `/readyz` are answered from the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Sampler failures in a row before it is reported unhealthy
pub const SAMPLER_UNHEALTHY_AFTER: u32 = 10;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Working normally
    Healthy,
    /// Working with reduced accuracy (fallback baseline, failed deliveries, skipped ticks)
    Degraded,
    /// Not producing results
    Unhealthy,
}

/// Last reported state of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failed operations since the last success
    pub consecutive_failures: u32,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>, consecutive_failures: u32) -> Self {
        Self {
            status,
            message,
            consecutive_failures,
            updated_at: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None, 0)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(message.into()), 0)
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        if components
            .values()
            .any(|c| c.status == ComponentStatus::Unhealthy)
        {
            ComponentStatus::Unhealthy
        } else if components
            .values()
            .any(|c| c.status == ComponentStatus::Degraded)
        {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const SAMPLER: &str = "sampler";
    pub const CALIBRATOR: &str = "calibrator";
    pub const NOTIFIER: &str = "notifier";
}

/// Shared registry of component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    /// Count a failure; the component turns unhealthy once `unhealthy_after`
    /// failures happen in a row, and is degraded before that
    pub async fn record_failure(
        &self,
        name: &str,
        message: impl Into<String>,
        unhealthy_after: u32,
    ) {
        let mut components = self.components.write().await;
        let failures = components
            .get(name)
            .map(|c| c.consecutive_failures)
            .unwrap_or(0)
            .saturating_add(1);

        let status = if failures >= unhealthy_after {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };

        components.insert(
            name.to_string(),
            ComponentHealth::new(status, Some(message.into()), failures),
        );
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        if !ready {
            ReadinessResponse {
                ready: false,
                reason: Some("Baseline not yet calibrated".to_string()),
            }
        } else if health.status == ComponentStatus::Unhealthy {
            ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}
