use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;

use crate::core::{AppError, Result};

/// Raw gateway entry as it arrives from env, YAML or an operator call
///
/// Nothing here is trusted yet: `GatewayRegistry::register_config` validates
/// it and fills the gaps from `GatewayDefaults`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub name: String,

    /// Gateway kind tag (`sandbox`, `stripe`, ...)
    pub kind: Option<String>,

    /// Reference to the credential in the secret store, never the secret itself
    pub credential_ref: Option<String>,

    /// `sandbox` or `production`
    pub environment: Option<String>,

    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub weight: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub max_retry_attempts: Option<u32>,
    pub health_check_enabled: Option<bool>,

    /// Restricts the adapter's own method list when set
    pub supported_methods: Option<Vec<String>>,

    /// Restricts the adapter's own currency list when set
    pub supported_currencies: Option<Vec<String>>,

    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,

    /// Driver-specific options passed through to the adapter constructor
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl GatewaySettings {
    pub fn new(name: impl Into<String>, kind: &str, credential_ref: &str) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind.to_string()),
            credential_ref: Some(credential_ref.to_string()),
            environment: Some("sandbox".to_string()),
            ..Default::default()
        }
    }

    /// Overlay every field that is set in `other`
    pub fn merged_with(&self, other: &GatewaySettings) -> GatewaySettings {
        let mut options = self.options.clone();
        options.extend(other.options.clone());

        GatewaySettings {
            name: self.name.clone(),
            kind: other.kind.clone().or_else(|| self.kind.clone()),
            credential_ref: other
                .credential_ref
                .clone()
                .or_else(|| self.credential_ref.clone()),
            environment: other.environment.clone().or_else(|| self.environment.clone()),
            enabled: other.enabled.or(self.enabled),
            priority: other.priority.or(self.priority),
            weight: other.weight.or(self.weight),
            timeout_ms: other.timeout_ms.or(self.timeout_ms),
            max_retry_attempts: other.max_retry_attempts.or(self.max_retry_attempts),
            health_check_enabled: other.health_check_enabled.or(self.health_check_enabled),
            supported_methods: other
                .supported_methods
                .clone()
                .or_else(|| self.supported_methods.clone()),
            supported_currencies: other
                .supported_currencies
                .clone()
                .or_else(|| self.supported_currencies.clone()),
            min_amount: other.min_amount.or(self.min_amount),
            max_amount: other.max_amount.or(self.max_amount),
            options,
        }
    }

    /// Read `GATEWAY_<NAME>_<FIELD>` variables for one gateway
    pub fn from_env(name: &str) -> Result<Self> {
        let prefix = format!("GATEWAY_{}_", name.to_uppercase().replace('-', "_"));
        let var = |field: &str| env::var(format!("{}{}", prefix, field)).ok();

        let parse_bool = |field: &str| -> Result<Option<bool>> {
            var(field)
                .map(|v| {
                    v.parse::<bool>().map_err(|_| {
                        AppError::Configuration(format!("Invalid {}{}: {}", prefix, field, v))
                    })
                })
                .transpose()
        };
        let list = |field: &str| {
            var(field).map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
        };

        Ok(Self {
            name: name.to_string(),
            kind: var("KIND"),
            credential_ref: var("CREDENTIAL_REF"),
            environment: var("ENVIRONMENT"),
            enabled: parse_bool("ENABLED")?,
            priority: parse_num(&prefix, "PRIORITY", var("PRIORITY"))?,
            weight: parse_num(&prefix, "WEIGHT", var("WEIGHT"))?,
            timeout_ms: parse_num(&prefix, "TIMEOUT_MS", var("TIMEOUT_MS"))?,
            max_retry_attempts: parse_num(&prefix, "MAX_RETRY_ATTEMPTS", var("MAX_RETRY_ATTEMPTS"))?,
            health_check_enabled: parse_bool("HEALTH_CHECK_ENABLED")?,
            supported_methods: list("METHODS"),
            supported_currencies: list("CURRENCIES"),
            min_amount: parse_num(&prefix, "MIN_AMOUNT", var("MIN_AMOUNT"))?,
            max_amount: parse_num(&prefix, "MAX_AMOUNT", var("MAX_AMOUNT"))?,
            options: match var("OPTIONS") {
                Some(raw) => serde_json::from_str(&raw)?,
                None => serde_json::Map::new(),
            },
        })
    }
}

fn parse_num<T: std::str::FromStr>(prefix: &str, field: &str, raw: Option<String>) -> Result<Option<T>> {
    raw.map(|v| {
        v.trim()
            .parse::<T>()
            .map_err(|_| AppError::Configuration(format!("Invalid {}{}: {}", prefix, field, v)))
    })
    .transpose()
}

/// Values merged into every gateway entry that leaves them unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayDefaults {
    pub priority: i32,
    pub weight: u32,
    pub timeout_ms: u64,
    pub max_retry_attempts: u32,
    pub health_check_enabled: bool,
}

impl Default for GatewayDefaults {
    fn default() -> Self {
        Self {
            priority: 100,
            weight: 1,
            timeout_ms: 30_000,
            max_retry_attempts: 3,
            health_check_enabled: true,
        }
    }
}
