use crate::core::{Currency, Result};
use crate::modules::payments::models::{CardDetails, Payment, PaymentMethod, PaymentRequest, PaymentStatus};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::performance::PerformanceMetrics;

/// Capability set every payment gateway adapter implements
///
/// One implementation per provider. Adapters report remote failures as
/// `AppError::GatewayOperation` with `retryable` set for 5xx, connection and
/// throttling errors, and cleared for declines and other 4xx responses.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// One-step sale
    async fn process_payment(&self, request: &GatewayPaymentRequest) -> Result<GatewayResponse>;

    /// Place an authorization hold
    async fn authorize_payment(&self, request: &GatewayPaymentRequest) -> Result<GatewayResponse>;

    /// Convert an authorization hold into a charge
    async fn capture_payment(&self, authorization_id: &str, amount: Decimal) -> Result<GatewayResponse>;

    /// Release an authorization hold
    async fn cancel_payment(&self, authorization_id: &str, reason: &str) -> Result<GatewayResponse>;

    async fn refund_payment(&self, request: &GatewayRefundRequest) -> Result<GatewayRefundResponse>;

    async fn check_transaction_status(&self, transaction_id: &str) -> Result<GatewayStatusResponse>;

    /// Cheap reachability probe used by the health monitor
    async fn test_connection(&self) -> Result<bool>;

    /// Adapter-side metrics, when the provider exposes any
    fn performance_metrics(&self) -> Option<PerformanceMetrics> {
        None
    }

    fn supports_method(&self, method: PaymentMethod) -> bool {
        self.supported_methods().contains(&method)
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        self.supported_currencies().contains(&currency)
    }

    fn is_amount_valid(&self, amount: Decimal, currency: Currency) -> bool {
        currency.validate_amount(amount).is_ok()
    }

    fn supported_methods(&self) -> Vec<PaymentMethod>;

    fn supported_currencies(&self) -> Vec<Currency>;

    fn name(&self) -> &str;

    fn api_version(&self) -> &str;

    fn is_active(&self) -> bool {
        true
    }
}

/// Payment submitted to a gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPaymentRequest {
    /// Local payment id, also sent as the idempotency key so retried
    /// attempts do not create duplicate charges
    pub payment_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub description: Option<String>,
    #[serde(skip_serializing)]
    pub card: Option<CardDetails>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl GatewayPaymentRequest {
    pub fn new(payment: &Payment, request: &PaymentRequest) -> Self {
        Self {
            payment_id: payment.id.clone(),
            amount: payment.amount,
            currency: payment.currency,
            payment_method: payment.payment_method,
            customer_id: payment.customer_id.clone(),
            order_id: payment.order_id.clone(),
            description: payment.description.clone(),
            card: request.card.clone(),
            metadata: request.metadata.clone(),
        }
    }
}

/// Gateway answer to sale, authorize, capture and cancel calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub authorization_id: Option<String>,

    /// Full gateway payload
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRefundRequest {
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub reason: String,

    /// Stable across retries of the same refund
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRefundResponse {
    pub refund_id: String,
    pub amount: Decimal,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayStatusResponse {
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub raw: serde_json::Value,
}
