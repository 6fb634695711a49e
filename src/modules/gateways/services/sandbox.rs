use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::models::GatewayConfig;
use crate::modules::payments::models::{PaymentMethod, PaymentStatus};

use super::gateway_trait::{
    GatewayPaymentRequest, GatewayRefundRequest, GatewayRefundResponse, GatewayResponse,
    GatewayStatusResponse, PaymentGateway,
};
use super::performance::PerformanceMetrics;

/// Scripted outcome for every remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxBehavior {
    #[default]
    AlwaysSucceed,
    /// Every call fails with a retryable 503
    AlwaysFail,
    /// The next `n` calls fail with a retryable 503, later calls succeed
    FailTimes(u32),
    /// Every call is declined (non-retryable)
    Decline,
    /// Every call hangs until the caller's deadline expires
    Timeout,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SandboxOptions {
    behavior: SandboxBehavior,
    latency_ms: u64,
    connected: bool,
    methods: Option<Vec<PaymentMethod>>,
    currencies: Option<Vec<Currency>>,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            behavior: SandboxBehavior::AlwaysSucceed,
            latency_ms: 0,
            connected: true,
            methods: None,
            currencies: None,
        }
    }
}

/// In-process gateway with scripted behaviour
///
/// Keeps its own transaction ledger so capture, cancel, refund and status
/// checks behave like a real provider would for the ids it handed out.
pub struct SandboxGateway {
    name: String,
    behavior: Mutex<SandboxBehavior>,
    failures_left: AtomicU32,
    connected: AtomicBool,
    active: AtomicBool,
    latency: Duration,
    methods: Vec<PaymentMethod>,
    currencies: Vec<Currency>,
    calls: AtomicU32,
    probes: AtomicU32,
    transactions: DashMap<String, PaymentStatus>,
    refunds_by_key: DashMap<String, String>,
    reported: Mutex<Option<PerformanceMetrics>>,
}

impl SandboxGateway {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behavior: Mutex::new(SandboxBehavior::AlwaysSucceed),
            failures_left: AtomicU32::new(0),
            connected: AtomicBool::new(true),
            active: AtomicBool::new(true),
            latency: Duration::ZERO,
            methods: PaymentMethod::ALL.to_vec(),
            currencies: Currency::ALL.to_vec(),
            calls: AtomicU32::new(0),
            probes: AtomicU32::new(0),
            transactions: DashMap::new(),
            refunds_by_key: DashMap::new(),
            reported: Mutex::new(None),
        }
    }

    /// Build from a registry entry; behaviour comes from `options`
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let options: SandboxOptions =
            serde_json::from_value(serde_json::Value::Object(config.options.clone()))?;

        let mut gateway = SandboxGateway::new(config.name.clone())
            .with_behavior(options.behavior)
            .with_latency(Duration::from_millis(options.latency_ms));
        if let Some(methods) = options.methods {
            gateway = gateway.with_methods(methods);
        }
        if let Some(currencies) = options.currencies {
            gateway = gateway.with_currencies(currencies);
        }
        gateway.set_connected(options.connected);
        Ok(gateway)
    }

    pub fn with_behavior(self, behavior: SandboxBehavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_methods(mut self, methods: Vec<PaymentMethod>) -> Self {
        self.methods = methods;
        self
    }

    pub fn with_currencies(mut self, currencies: Vec<Currency>) -> Self {
        self.currencies = currencies;
        self
    }

    pub fn set_behavior(&self, behavior: SandboxBehavior) {
        if let SandboxBehavior::FailTimes(n) = behavior {
            self.failures_left.store(n, Ordering::SeqCst);
        }
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Overwrite what the provider reports for a transaction
    pub fn set_transaction_status(&self, transaction_id: &str, status: PaymentStatus) {
        self.transactions.insert(transaction_id.to_string(), status);
    }

    /// Metrics handed out as if the provider reported them
    pub fn set_reported_metrics(&self, metrics: Option<PerformanceMetrics>) {
        *self.reported.lock().unwrap_or_else(PoisonError::into_inner) = metrics;
    }

    /// Remote operations attempted, excluding connectivity probes
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    async fn outcome(&self, operation: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let behavior = *self.behavior.lock().unwrap_or_else(PoisonError::into_inner);
        match behavior {
            SandboxBehavior::AlwaysSucceed => Ok(()),
            SandboxBehavior::AlwaysFail => Err(AppError::transient(
                &self.name,
                format!("{}: HTTP 503 Service Unavailable", operation),
            )),
            SandboxBehavior::FailTimes(_) => {
                let failed = self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                    .is_ok();
                if failed {
                    Err(AppError::transient(
                        &self.name,
                        format!("{}: HTTP 502 Bad Gateway", operation),
                    ))
                } else {
                    Ok(())
                }
            }
            SandboxBehavior::Decline => Err(AppError::declined(
                &self.name,
                format!("{}: card_declined", operation),
            )),
            SandboxBehavior::Timeout => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    fn new_reference(prefix: &str) -> String {
        format!("sbx_{}_{}", prefix, uuid::Uuid::new_v4().simple())
    }

    fn require_status(&self, reference: &str, expected: &[PaymentStatus]) -> Result<()> {
        let current = self
            .transactions
            .get(reference)
            .map(|s| *s)
            .ok_or_else(|| AppError::declined(&self.name, format!("unknown reference {}", reference)))?;
        if !expected.contains(&current) {
            return Err(AppError::declined(
                &self.name,
                format!("reference {} is {}", reference, current),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn process_payment(&self, request: &GatewayPaymentRequest) -> Result<GatewayResponse> {
        self.outcome("process_payment").await?;
        let transaction_id = Self::new_reference("txn");
        self.transactions
            .insert(transaction_id.clone(), PaymentStatus::Paid);

        Ok(GatewayResponse {
            transaction_id: transaction_id.clone(),
            status: PaymentStatus::Paid,
            authorization_id: None,
            raw: json!({
                "id": transaction_id,
                "status": "succeeded",
                "amount": request.amount.to_string(),
                "currency": request.currency,
                "idempotency_key": request.payment_id,
            }),
        })
    }

    async fn authorize_payment(&self, request: &GatewayPaymentRequest) -> Result<GatewayResponse> {
        self.outcome("authorize_payment").await?;
        let authorization_id = Self::new_reference("auth");
        self.transactions
            .insert(authorization_id.clone(), PaymentStatus::Authorized);

        Ok(GatewayResponse {
            transaction_id: authorization_id.clone(),
            status: PaymentStatus::Authorized,
            authorization_id: Some(authorization_id.clone()),
            raw: json!({
                "id": authorization_id,
                "status": "authorized",
                "amount": request.amount.to_string(),
                "currency": request.currency,
            }),
        })
    }

    async fn capture_payment(&self, authorization_id: &str, amount: Decimal) -> Result<GatewayResponse> {
        self.outcome("capture_payment").await?;
        self.require_status(authorization_id, &[PaymentStatus::Authorized])?;
        self.set_transaction_status(authorization_id, PaymentStatus::Captured);

        Ok(GatewayResponse {
            transaction_id: authorization_id.to_string(),
            status: PaymentStatus::Captured,
            authorization_id: Some(authorization_id.to_string()),
            raw: json!({
                "id": authorization_id,
                "status": "captured",
                "amount_captured": amount.to_string(),
            }),
        })
    }

    async fn cancel_payment(&self, authorization_id: &str, reason: &str) -> Result<GatewayResponse> {
        self.outcome("cancel_payment").await?;
        self.require_status(authorization_id, &[PaymentStatus::Authorized])?;
        self.set_transaction_status(authorization_id, PaymentStatus::Cancelled);

        Ok(GatewayResponse {
            transaction_id: authorization_id.to_string(),
            status: PaymentStatus::Cancelled,
            authorization_id: Some(authorization_id.to_string()),
            raw: json!({ "id": authorization_id, "status": "voided", "reason": reason }),
        })
    }

    async fn refund_payment(&self, request: &GatewayRefundRequest) -> Result<GatewayRefundResponse> {
        self.outcome("refund_payment").await?;
        self.require_status(
            &request.transaction_id,
            &[PaymentStatus::Paid, PaymentStatus::Captured],
        )?;

        // replayed idempotency keys return the original refund
        let refund_id = self
            .refunds_by_key
            .entry(request.idempotency_key.clone())
            .or_insert_with(|| Self::new_reference("rf"))
            .clone();

        Ok(GatewayRefundResponse {
            refund_id: refund_id.clone(),
            amount: request.amount,
            raw: json!({
                "id": refund_id,
                "charge": request.transaction_id,
                "amount": request.amount.to_string(),
                "reason": request.reason,
            }),
        })
    }

    async fn check_transaction_status(&self, transaction_id: &str) -> Result<GatewayStatusResponse> {
        self.outcome("check_transaction_status").await?;
        let status = self
            .transactions
            .get(transaction_id)
            .map(|s| *s)
            .ok_or_else(|| AppError::not_found(format!("Transaction '{}' not found", transaction_id)))?;

        Ok(GatewayStatusResponse {
            transaction_id: transaction_id.to_string(),
            status,
            raw: json!({ "id": transaction_id, "status": status }),
        })
    }

    async fn test_connection(&self) -> Result<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.connected.load(Ordering::SeqCst))
    }

    fn performance_metrics(&self) -> Option<PerformanceMetrics> {
        self.reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn supported_methods(&self) -> Vec<PaymentMethod> {
        self.methods.clone()
    }

    fn supported_currencies(&self) -> Vec<Currency> {
        self.currencies.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn api_version(&self) -> &str {
        "sandbox-2024-01"
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
