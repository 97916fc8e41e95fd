//! Unified health-check types shared by the resilience health registry and
//! every component that exposes a probe (vector store, cache, auth).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health status of a single probe or the aggregate system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of a single named health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub component: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub latency_ms: Option<u64>,
    /// Probes marked critical can drag the aggregate to `Unhealthy`;
    /// non-critical probes can only drag it to `Degraded`.
    pub critical: bool,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl HealthCheck {
    pub fn healthy(component: impl Into<String>, critical: bool) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
            latency_ms: None,
            critical,
            metadata: HashMap::new(),
        }
    }

    pub fn degraded(component: impl Into<String>, critical: bool, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            latency_ms: None,
            critical,
            metadata: HashMap::new(),
        }
    }

    pub fn unhealthy(component: impl Into<String>, critical: bool, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            latency_ms: None,
            critical,
            metadata: HashMap::new(),
        }
    }

    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }
}

/// Aggregate of every probe's last result.
///
/// Aggregation rule (spec §4.1): overall is `Unhealthy` iff any critical
/// probe is `Unhealthy`; `Degraded` iff any probe is `Degraded` or any
/// non-critical probe is `Unhealthy`; else `Healthy`.
pub fn aggregate(checks: &[HealthCheck]) -> HealthStatus {
    let any_critical_unhealthy = checks
        .iter()
        .any(|c| c.critical && c.status == HealthStatus::Unhealthy);
    if any_critical_unhealthy {
        return HealthStatus::Unhealthy;
    }
    let any_degraded_or_noncritical_unhealthy = checks.iter().any(|c| {
        c.status == HealthStatus::Degraded || (!c.critical && c.status == HealthStatus::Unhealthy)
    });
    if any_degraded_or_noncritical_unhealthy {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}
