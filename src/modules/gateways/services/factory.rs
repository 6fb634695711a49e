use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{AppError, Result};
use crate::modules::gateways::models::{GatewayConfig, GatewayKind};

use super::gateway_trait::PaymentGateway;
use super::sandbox::SandboxGateway;

/// Adapter constructor for one gateway kind
pub type GatewayConstructor =
    Arc<dyn Fn(&GatewayConfig) -> Result<Arc<dyn PaymentGateway>> + Send + Sync>;

/// Maps a gateway kind to the constructor that builds its adapter
///
/// Provider SDK adapters live outside this crate and plug in through
/// `register`. Only the sandbox adapter ships built in.
#[derive(Clone, Default)]
pub struct GatewayFactory {
    constructors: HashMap<GatewayKind, GatewayConstructor>,
}

impl GatewayFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory with the built-in sandbox adapter registered
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        factory.register(GatewayKind::Sandbox, |config| {
            Ok(Arc::new(SandboxGateway::from_config(config)?) as Arc<dyn PaymentGateway>)
        });
        factory
    }

    pub fn register<F>(&mut self, kind: GatewayKind, constructor: F)
    where
        F: Fn(&GatewayConfig) -> Result<Arc<dyn PaymentGateway>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Arc::new(constructor));
    }

    pub fn supports(&self, kind: GatewayKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    pub fn build(&self, config: &GatewayConfig) -> Result<Arc<dyn PaymentGateway>> {
        let constructor = self.constructors.get(&config.kind).ok_or_else(|| {
            AppError::Configuration(format!(
                "No adapter registered for gateway kind '{}' (gateway '{}')",
                config.kind, config.name
            ))
        })?;
        constructor(config)
    }
}

impl std::fmt::Debug for GatewayFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<String> = self.constructors.keys().map(|k| k.to_string()).collect();
        kinds.sort();
        f.debug_struct("GatewayFactory").field("kinds", &kinds).finish()
    }
}
