use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::Currency;
use crate::modules::gateways::services::load_balancer::SelectionCriteria;
use crate::modules::payments::models::PaymentMethod;

/// Closed set of gateway kinds the factory can know about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// In-process adapter with scripted behaviour
    Sandbox,
    Stripe,
    Paypal,
    Xendit,
    Midtrans,
}

impl std::fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayKind::Sandbox => "sandbox",
            GatewayKind::Stripe => "stripe",
            GatewayKind::Paypal => "paypal",
            GatewayKind::Xendit => "xendit",
            GatewayKind::Midtrans => "midtrans",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for GatewayKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sandbox" => Ok(GatewayKind::Sandbox),
            "stripe" => Ok(GatewayKind::Stripe),
            "paypal" => Ok(GatewayKind::Paypal),
            "xendit" => Ok(GatewayKind::Xendit),
            "midtrans" => Ok(GatewayKind::Midtrans),
            _ => Err(format!("Unknown gateway kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayEnvironment {
    Sandbox,
    Production,
}

impl std::fmt::Display for GatewayEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayEnvironment::Sandbox => write!(f, "sandbox"),
            GatewayEnvironment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for GatewayEnvironment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sandbox" | "test" => Ok(GatewayEnvironment::Sandbox),
            "production" | "live" => Ok(GatewayEnvironment::Production),
            _ => Err(format!("Invalid gateway environment: {}", s)),
        }
    }
}

/// Validated, defaults-merged gateway configuration owned by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub name: String,
    pub kind: GatewayKind,
    pub environment: GatewayEnvironment,
    pub credential_ref: String,
    pub enabled: bool,

    /// Lower value sorts first in candidate lists
    pub priority: i32,

    /// Relative share under weighted selection, always >= 1
    pub weight: u32,

    pub timeout_ms: u64,
    pub max_retry_attempts: u32,
    pub health_check_enabled: bool,

    pub supported_methods: Option<Vec<PaymentMethod>>,
    pub supported_currencies: Option<Vec<Currency>>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,

    pub options: serde_json::Map<String, serde_json::Value>,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Operator-side restrictions; adapter capabilities are checked separately
    pub fn permits(&self, criteria: &SelectionCriteria) -> bool {
        let method_ok = self
            .supported_methods
            .as_ref()
            .map_or(true, |methods| methods.contains(&criteria.payment_method));
        let currency_ok = self
            .supported_currencies
            .as_ref()
            .map_or(true, |currencies| currencies.contains(&criteria.currency));
        let min_ok = self.min_amount.map_or(true, |min| criteria.amount >= min);
        let max_ok = self.max_amount.map_or(true, |max| criteria.amount <= max);

        method_ok && currency_ok && min_ok && max_ok
    }
}
