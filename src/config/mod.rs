use crate::core::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;

pub mod gateway;
pub mod resilience;

pub use gateway::{GatewayDefaults, GatewaySettings};
pub use resilience::{CircuitSettings, HealthSettings, OrchestratorSettings, RetrySettings};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub orchestrator: OrchestratorSettings,
    pub gateway_defaults: GatewayDefaults,
    pub gateways: Vec<GatewaySettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,

    /// `pretty` or `json`
    pub log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let defaults = Config::default();
        let orchestrator = OrchestratorSettings {
            strategy: match env::var("LB_STRATEGY") {
                Ok(v) => v.parse().map_err(AppError::Configuration)?,
                Err(_) => defaults.orchestrator.strategy,
            },
            failover_enabled: env_or("FAILOVER_ENABLED", defaults.orchestrator.failover_enabled)?,
            retry: RetrySettings {
                base_delay_ms: env_or("RETRY_BASE_DELAY_MS", defaults.orchestrator.retry.base_delay_ms)?,
                max_delay_ms: env_or("RETRY_MAX_DELAY_MS", defaults.orchestrator.retry.max_delay_ms)?,
                backoff_factor: env_or(
                    "RETRY_BACKOFF_FACTOR",
                    defaults.orchestrator.retry.backoff_factor,
                )?,
            },
            circuit: CircuitSettings {
                failure_threshold: env_or(
                    "CIRCUIT_FAILURE_THRESHOLD",
                    defaults.orchestrator.circuit.failure_threshold,
                )?,
                open_timeout_secs: env_or(
                    "CIRCUIT_OPEN_TIMEOUT_SECS",
                    defaults.orchestrator.circuit.open_timeout_secs,
                )?,
            },
            health: HealthSettings {
                healthy_ttl_secs: env_or(
                    "HEALTH_HEALTHY_TTL_SECS",
                    defaults.orchestrator.health.healthy_ttl_secs,
                )?,
                unhealthy_ttl_secs: env_or(
                    "HEALTH_UNHEALTHY_TTL_SECS",
                    defaults.orchestrator.health.unhealthy_ttl_secs,
                )?,
            },
        };

        let gateways = env::var("GATEWAYS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(GatewaySettings::from_env)
            .collect::<Result<Vec<_>>>()?;

        Ok(Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or(defaults.app.env),
                log_level: env::var("LOG_LEVEL").unwrap_or(defaults.app.log_level),
                log_format: env::var("LOG_FORMAT").unwrap_or(defaults.app.log_format),
            },
            orchestrator,
            gateway_defaults: GatewayDefaults {
                priority: env_or("GATEWAY_DEFAULT_PRIORITY", defaults.gateway_defaults.priority)?,
                weight: env_or("GATEWAY_DEFAULT_WEIGHT", defaults.gateway_defaults.weight)?,
                timeout_ms: env_or("GATEWAY_DEFAULT_TIMEOUT_MS", defaults.gateway_defaults.timeout_ms)?,
                max_retry_attempts: env_or(
                    "GATEWAY_DEFAULT_MAX_RETRY_ATTEMPTS",
                    defaults.gateway_defaults.max_retry_attempts,
                )?,
                health_check_enabled: env_or(
                    "GATEWAY_DEFAULT_HEALTH_CHECK_ENABLED",
                    defaults.gateway_defaults.health_check_enabled,
                )?,
            },
            gateways,
        })
    }

    /// Parse a YAML document with the same shape as `Config`
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let retry = &self.orchestrator.retry;
        if retry.backoff_factor < 1.0 {
            return Err(AppError::Configuration(
                "Retry backoff factor must be at least 1.0".to_string(),
            ));
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            return Err(AppError::Configuration(
                "Retry max delay must not be lower than the base delay".to_string(),
            ));
        }

        if self.orchestrator.circuit.failure_threshold == 0 {
            return Err(AppError::Configuration(
                "Circuit failure threshold must be greater than 0".to_string(),
            ));
        }

        if self.gateway_defaults.max_retry_attempts == 0 {
            return Err(AppError::Configuration(
                "Default max retry attempts must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for gateway in &self.gateways {
            if gateway.name.trim().is_empty() {
                return Err(AppError::Configuration("Gateway name cannot be empty".to_string()));
            }
            if !seen.insert(gateway.name.as_str()) {
                return Err(AppError::Configuration(format!(
                    "Gateway '{}' is configured twice",
                    gateway.name
                )));
            }
            if gateway
                .credential_ref
                .as_deref()
                .map_or(true, |c| c.trim().is_empty())
            {
                return Err(AppError::Configuration(format!(
                    "Gateway '{}' has no credential reference",
                    gateway.name
                )));
            }
            if gateway.max_retry_attempts == Some(0) {
                return Err(AppError::Configuration(format!(
                    "Gateway '{}' must allow at least one attempt",
                    gateway.name
                )));
            }
        }

        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Configuration(format!("Invalid {}: {}", key, v))),
        Err(_) => Ok(default),
    }
}
