//! Named health probes run on a fixed schedule and on demand (spec §4.1).

use aegis_core::{aggregate, HealthCheck, HealthStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> HealthCheck;
    fn critical(&self) -> bool;
    fn name(&self) -> &str;
}

struct Registered {
    probe: Arc<dyn Probe>,
    last: Option<HealthCheck>,
}

/// Aggregates named probes into an overall health status. Probes run
/// on-demand via `check_now` or `check_all`; a background scheduler can call
/// `check_all` on a fixed interval and the last results remain available via
/// `last_known`.
pub struct HealthRegistry {
    probes: RwLock<HashMap<String, Registered>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            probes: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, probe: Arc<dyn Probe>) {
        self.probes.write().insert(
            probe.name().to_string(),
            Registered { probe, last: None },
        );
    }

    pub async fn check_one(&self, name: &str) -> Option<HealthCheck> {
        let probe = { self.probes.read().get(name).map(|r| r.probe.clone()) }?;
        let start = Instant::now();
        let mut result = probe.check().await;
        result.latency_ms = Some(start.elapsed().as_millis() as u64);
        self.probes
            .write()
            .get_mut(name)
            .map(|r| r.last = Some(result.clone()));
        Some(result)
    }

    pub async fn check_all(&self) -> Vec<HealthCheck> {
        let probes: Vec<Arc<dyn Probe>> =
            self.probes.read().values().map(|r| r.probe.clone()).collect();
        let mut results = Vec::with_capacity(probes.len());
        for probe in probes {
            let start = Instant::now();
            let mut result = probe.check().await;
            result.latency_ms = Some(start.elapsed().as_millis() as u64);
            self.probes
                .write()
                .get_mut(probe.name())
                .map(|r| r.last = Some(result.clone()));
            results.push(result);
        }
        results
    }

    pub fn last_known(&self) -> Vec<HealthCheck> {
        self.probes
            .read()
            .values()
            .filter_map(|r| r.last.clone())
            .collect()
    }

    pub fn overall(&self) -> HealthStatus {
        aggregate(&self.last_known())
    }
}

pub async fn run_on_interval(registry: Arc<HealthRegistry>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        registry.check_all().await;
    }
}
