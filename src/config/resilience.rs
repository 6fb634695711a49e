use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::modules::gateways::services::load_balancer::LoadBalancingStrategy;

/// Backoff shape shared by every gateway; attempt counts are per gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitSettings {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// How long an open circuit rejects calls before allowing a trial
    pub open_timeout_secs: u64,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_secs: 60,
        }
    }
}

impl CircuitSettings {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub healthy_ttl_secs: u64,
    pub unhealthy_ttl_secs: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            healthy_ttl_secs: 300,
            unhealthy_ttl_secs: 60,
        }
    }
}

impl HealthSettings {
    pub fn healthy_ttl(&self) -> Duration {
        Duration::from_secs(self.healthy_ttl_secs)
    }

    pub fn unhealthy_ttl(&self) -> Duration {
        Duration::from_secs(self.unhealthy_ttl_secs)
    }
}

/// Orchestrator-wide behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub strategy: LoadBalancingStrategy,
    pub failover_enabled: bool,
    pub retry: RetrySettings,
    pub circuit: CircuitSettings,
    pub health: HealthSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            strategy: LoadBalancingStrategy::RoundRobin,
            failover_enabled: true,
            retry: RetrySettings::default(),
            circuit: CircuitSettings::default(),
            health: HealthSettings::default(),
        }
    }
}
