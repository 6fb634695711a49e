use dashmap::DashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{GatewayDefaults, GatewaySettings};
use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::models::{GatewayConfig, GatewayEnvironment, GatewayKind};
use crate::modules::payments::models::PaymentMethod;

use super::circuit_breaker::CircuitBreaker;
use super::factory::GatewayFactory;
use super::gateway_trait::PaymentGateway;
use super::health_monitor::HealthCache;
use super::performance::PerformanceTracker;

#[derive(Debug, Clone)]
struct RegisteredGateway {
    /// What the operator supplied, kept so updates can be merged
    settings: GatewaySettings,
    config: GatewayConfig,
}

/// Gateway configurations plus lazily built, cached adapters
///
/// Any change to a gateway's configuration drops its cached adapter,
/// health result and performance counters. Removal also clears its circuit.
pub struct GatewayRegistry {
    gateways: DashMap<String, RegisteredGateway>,
    instances: DashMap<String, Arc<dyn PaymentGateway>>,
    factory: GatewayFactory,
    defaults: GatewayDefaults,
    breaker: Arc<CircuitBreaker>,
    health: Arc<HealthCache>,
    performance: Arc<PerformanceTracker>,
}

impl GatewayRegistry {
    pub fn new(
        factory: GatewayFactory,
        defaults: GatewayDefaults,
        breaker: Arc<CircuitBreaker>,
        health: Arc<HealthCache>,
        performance: Arc<PerformanceTracker>,
    ) -> Self {
        Self {
            gateways: DashMap::new(),
            instances: DashMap::new(),
            factory,
            defaults,
            breaker,
            health,
            performance,
        }
    }

    /// Validate `settings`, merge defaults and store under `name`
    ///
    /// Registering an existing name replaces it.
    pub fn register_config(&self, name: &str, settings: GatewaySettings) -> Result<GatewayConfig> {
        let settings = GatewaySettings {
            name: name.to_string(),
            ..settings
        };
        let config = self.build_config(&settings)?;

        self.gateways.insert(
            name.to_string(),
            RegisteredGateway {
                settings,
                config: config.clone(),
            },
        );
        self.invalidate(name);

        info!(
            gateway = %name,
            kind = %config.kind,
            environment = %config.environment,
            enabled = config.enabled,
            "Gateway registered"
        );
        Ok(config)
    }

    /// Overlay the set fields of `patch` on the stored settings
    pub fn update_config(&self, name: &str, patch: GatewaySettings) -> Result<GatewayConfig> {
        let mut entry = self
            .gateways
            .get_mut(name)
            .ok_or_else(|| AppError::GatewayNotConfigured(name.to_string()))?;

        let settings = entry.settings.merged_with(&patch);
        let config = self.build_config(&settings)?;
        entry.settings = settings;
        entry.config = config.clone();
        drop(entry);

        self.invalidate(name);
        info!(gateway = %name, "Gateway configuration updated");
        Ok(config)
    }

    pub fn enable(&self, name: &str) -> Result<()> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> Result<()> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut entry = self
            .gateways
            .get_mut(name)
            .ok_or_else(|| AppError::GatewayNotConfigured(name.to_string()))?;
        entry.settings.enabled = Some(enabled);
        entry.config.enabled = enabled;
        drop(entry);

        self.invalidate(name);
        info!(gateway = %name, enabled, "Gateway toggled");
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<GatewayConfig> {
        let (_, removed) = self
            .gateways
            .remove(name)
            .ok_or_else(|| AppError::GatewayNotConfigured(name.to_string()))?;

        self.invalidate(name);
        self.breaker.remove(name);
        info!(gateway = %name, "Gateway removed");
        Ok(removed.config)
    }

    pub fn get_config(&self, name: &str) -> Result<GatewayConfig> {
        self.gateways
            .get(name)
            .map(|entry| entry.config.clone())
            .ok_or_else(|| AppError::GatewayNotConfigured(name.to_string()))
    }

    /// Cached adapter for `name`, built through the factory on first use
    pub fn get_gateway(&self, name: &str) -> Result<Arc<dyn PaymentGateway>> {
        let config = self.get_config(name)?;
        if !config.enabled {
            return Err(AppError::GatewayDisabled(name.to_string()));
        }

        let instance = self
            .instances
            .entry(name.to_string())
            .or_try_insert_with(|| {
                debug!(gateway = %name, kind = %config.kind, "Building gateway adapter");
                self.factory.build(&config)
            })?;
        Ok(instance.clone())
    }

    /// Registered names ordered by priority, then name
    pub fn names(&self) -> Vec<String> {
        self.sorted_configs().into_iter().map(|c| c.name).collect()
    }

    pub fn enabled_configs(&self) -> Vec<GatewayConfig> {
        self.sorted_configs()
            .into_iter()
            .filter(|config| config.enabled)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }

    /// Fail when a registered gateway's kind has no adapter constructor
    pub fn validate_kinds(&self) -> Result<()> {
        let mut missing: Vec<String> = self
            .sorted_configs()
            .into_iter()
            .filter(|config| !self.factory.supports(config.kind))
            .map(|config| format!("{} ({})", config.name, config.kind))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(AppError::Configuration(format!(
            "No adapter registered for: {}",
            missing.join(", ")
        )))
    }

    fn sorted_configs(&self) -> Vec<GatewayConfig> {
        let mut configs: Vec<GatewayConfig> =
            self.gateways.iter().map(|entry| entry.config.clone()).collect();
        configs.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        configs
    }

    fn invalidate(&self, name: &str) {
        self.instances.remove(name);
        self.health.invalidate(name);
        self.performance.remove(name);
    }

    fn build_config(&self, settings: &GatewaySettings) -> Result<GatewayConfig> {
        let name = settings.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Gateway name is required"));
        }

        let credential_ref = settings
            .credential_ref
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                AppError::validation(format!("Gateway '{}' requires a credential reference", name))
            })?;

        let kind = settings
            .kind
            .as_deref()
            .ok_or_else(|| AppError::validation(format!("Gateway '{}' requires a kind", name)))
            .and_then(|raw| GatewayKind::from_str(raw).map_err(AppError::Validation))?;

        let environment = settings
            .environment
            .as_deref()
            .ok_or_else(|| AppError::validation(format!("Gateway '{}' requires an environment", name)))
            .and_then(|raw| GatewayEnvironment::from_str(raw).map_err(AppError::Validation))?;

        let weight = settings.weight.unwrap_or(self.defaults.weight);
        if weight == 0 {
            return Err(AppError::validation(format!(
                "Gateway '{}' weight must be at least 1",
                name
            )));
        }
        let timeout_ms = settings.timeout_ms.unwrap_or(self.defaults.timeout_ms);
        if timeout_ms == 0 {
            return Err(AppError::validation(format!(
                "Gateway '{}' timeout must be greater than 0",
                name
            )));
        }
        let max_retry_attempts = settings
            .max_retry_attempts
            .unwrap_or(self.defaults.max_retry_attempts);
        if max_retry_attempts == 0 {
            return Err(AppError::validation(format!(
                "Gateway '{}' must allow at least one attempt",
                name
            )));
        }

        if let (Some(min), Some(max)) = (settings.min_amount, settings.max_amount) {
            if min > max {
                return Err(AppError::validation(format!(
                    "Gateway '{}' min amount exceeds max amount",
                    name
                )));
            }
        }

        let supported_methods = settings
            .supported_methods
            .as_ref()
            .map(|raw| {
                raw.iter()
                    .map(|m| PaymentMethod::from_str(m).map_err(AppError::Validation))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;
        let supported_currencies = settings
            .supported_currencies
            .as_ref()
            .map(|raw| {
                raw.iter()
                    .map(|c| Currency::from_str(c).map_err(AppError::Validation))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;

        Ok(GatewayConfig {
            name: name.to_string(),
            kind,
            environment,
            credential_ref: credential_ref.to_string(),
            enabled: settings.enabled.unwrap_or(true),
            priority: settings.priority.unwrap_or(self.defaults.priority),
            weight,
            timeout_ms,
            max_retry_attempts,
            health_check_enabled: settings
                .health_check_enabled
                .unwrap_or(self.defaults.health_check_enabled),
            supported_methods,
            supported_currencies,
            min_amount: settings.min_amount,
            max_amount: settings.max_amount,
            options: settings.options.clone(),
        })
    }
}
