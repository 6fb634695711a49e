use dashmap::DashMap;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::HealthSettings;
use crate::core::{EventSink, OrchestrationEvent, Result};

use super::circuit_breaker::CircuitBreaker;
use super::registry::GatewayRegistry;
use super::retry::with_deadline;

#[derive(Debug, Clone, Copy)]
struct HealthEntry {
    healthy: bool,
    expires_at: Instant,
}

/// Probe results with separate TTLs for healthy and unhealthy outcomes
#[derive(Debug)]
pub struct HealthCache {
    entries: DashMap<String, HealthEntry>,
    healthy_ttl: Duration,
    unhealthy_ttl: Duration,
}

impl HealthCache {
    pub fn new(settings: &HealthSettings) -> Self {
        Self {
            entries: DashMap::new(),
            healthy_ttl: settings.healthy_ttl(),
            unhealthy_ttl: settings.unhealthy_ttl(),
        }
    }

    /// Unexpired cached result, if any
    pub fn get(&self, gateway: &str) -> Option<bool> {
        let entry = *self.entries.get(gateway)?;
        if Instant::now() < entry.expires_at {
            Some(entry.healthy)
        } else {
            None
        }
    }

    pub fn store(&self, gateway: &str, healthy: bool) {
        let ttl = if healthy { self.healthy_ttl } else { self.unhealthy_ttl };
        self.entries.insert(
            gateway.to_string(),
            HealthEntry {
                healthy,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn invalidate(&self, gateway: &str) {
        self.entries.remove(gateway);
    }
}

/// Active reachability probing combined with circuit state
pub struct HealthMonitor {
    registry: Arc<GatewayRegistry>,
    breaker: Arc<CircuitBreaker>,
    cache: Arc<HealthCache>,
    events: Arc<dyn EventSink>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<GatewayRegistry>,
        breaker: Arc<CircuitBreaker>,
        cache: Arc<HealthCache>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            breaker,
            cache,
            events,
        }
    }

    /// Probe the gateway, or answer from cache while the last result is fresh
    ///
    /// Gateways with health checks switched off are reported healthy without
    /// a probe. Probe errors and deadline expiry count as unhealthy.
    pub async fn check_health(&self, gateway: &str) -> Result<bool> {
        let config = self.registry.get_config(gateway)?;
        if !config.health_check_enabled {
            return Ok(true);
        }
        if let Some(healthy) = self.cache.get(gateway) {
            return Ok(healthy);
        }

        let adapter = self.registry.get_gateway(gateway)?;
        let started = Instant::now();
        let healthy = match with_deadline(gateway, config.timeout(), adapter.test_connection()).await {
            Ok(connected) => connected,
            Err(e) => {
                warn!(gateway = %gateway, error = %e, "Health probe failed");
                false
            }
        };
        let response_time_ms = started.elapsed().as_millis() as u64;

        self.cache.store(gateway, healthy);
        self.events.emit(OrchestrationEvent::HealthChecked {
            gateway: gateway.to_string(),
            healthy,
            response_time_ms,
        });

        Ok(healthy)
    }

    /// Healthy and not blocked by its circuit
    pub async fn is_available(&self, gateway: &str) -> bool {
        if !self.breaker.is_available(gateway) {
            debug!(gateway = %gateway, "Gateway unavailable: circuit open");
            return false;
        }
        match self.check_health(gateway).await {
            Ok(healthy) => healthy,
            Err(e) => {
                debug!(gateway = %gateway, error = %e, "Gateway unavailable");
                false
            }
        }
    }

    pub fn cached_health(&self, gateway: &str) -> Option<bool> {
        self.cache.get(gateway)
    }

    pub fn invalidate(&self, gateway: &str) {
        self.cache.invalidate(gateway);
    }

    /// Probe every enabled gateway concurrently
    pub async fn check_all(&self) -> Vec<(String, bool)> {
        let names: Vec<String> = self
            .registry
            .enabled_configs()
            .into_iter()
            .map(|config| config.name)
            .collect();

        let results = join_all(names.iter().map(|name| self.check_health(name))).await;

        names
            .into_iter()
            .zip(results)
            .map(|(name, result)| (name, result.unwrap_or(false)))
            .collect()
    }
}
