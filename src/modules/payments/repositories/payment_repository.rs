use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::core::{AppError, Currency, Result};

use super::super::models::{
    Payment, PaymentFilters, PaymentMethod, PaymentRequest, PaymentStatistics, PaymentStatus,
    Refund,
};

/// Fields needed to open a new payment record
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub gateway: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub description: Option<String>,
}

impl NewPayment {
    pub fn from_request(request: &PaymentRequest, method: PaymentMethod, gateway: &str) -> Self {
        Self {
            gateway: gateway.to_string(),
            amount: request.amount,
            currency: request.currency,
            payment_method: method,
            customer_id: request.customer_id.clone(),
            order_id: request.order_id.clone(),
            description: request.description.clone(),
        }
    }
}

/// Status change with the gateway data that came with it
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: PaymentStatus,

    /// Optimistic concurrency guard; `None` skips the check
    pub expected_version: Option<u64>,

    pub transaction_id: Option<String>,
    pub authorization_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
}

impl StatusUpdate {
    pub fn to(status: PaymentStatus) -> Self {
        Self {
            status,
            expected_version: None,
            transaction_id: None,
            authorization_id: None,
            gateway_response: None,
        }
    }

    pub fn expecting(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn with_transaction(mut self, transaction_id: Option<String>) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    pub fn with_authorization(mut self, authorization_id: Option<String>) -> Self {
        self.authorization_id = authorization_id;
        self
    }

    pub fn with_response(mut self, response: serde_json::Value) -> Self {
        self.gateway_response = Some(response);
        self
    }
}

/// Storage collaborator for payments
///
/// The orchestrator only ever talks to this interface. Implementations must
/// reject illegal lifecycle transitions and refunds that would push the
/// refunded total above the settled amount.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Open a payment in `processing`
    async fn create(&self, payment: NewPayment) -> Result<Payment>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Payment>>;

    async fn update_status(&self, id: &str, update: StatusUpdate) -> Result<Payment>;

    async fn mark_as_failed(&self, id: &str, reason: &str) -> Result<Payment>;

    async fn mark_as_captured(
        &self,
        id: &str,
        amount: Decimal,
        gateway_response: Option<serde_json::Value>,
    ) -> Result<Payment>;

    async fn mark_as_cancelled(&self, id: &str, reason: &str) -> Result<Payment>;

    async fn mark_as_refunded(&self, id: &str) -> Result<Payment>;

    /// Append a refund, enforcing the refundable balance
    async fn add_refund(&self, id: &str, refund: Refund) -> Result<Payment>;

    async fn get_total_refunded(&self, id: &str) -> Result<Decimal>;

    async fn get_statistics(&self, filters: &PaymentFilters) -> Result<PaymentStatistics>;

    async fn find_by_filters(&self, filters: &PaymentFilters) -> Result<Vec<Payment>>;
}

/// Process-local repository backed by a sharded concurrent map
///
/// Each mutation holds the entry's shard lock for the whole
/// read-check-write, so checks and writes on one payment are atomic.
#[derive(Debug, Default)]
pub struct InMemoryPaymentRepository {
    payments: DashMap<String, Payment>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }

    /// Apply `f` to the stored payment under its entry lock
    fn mutate<F>(&self, id: &str, f: F) -> Result<Payment>
    where
        F: FnOnce(&mut Payment) -> Result<()>,
    {
        let mut entry = self
            .payments
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("Payment '{}' not found", id)))?;

        // work on a copy so a failed check leaves the record untouched
        let mut updated = entry.clone();
        f(&mut updated)?;
        updated.version += 1;
        updated.updated_at = Utc::now();
        *entry = updated.clone();
        Ok(updated)
    }

    // re-applying the current status is allowed so gateway data can be attached
    fn transition(payment: &mut Payment, next: PaymentStatus) -> Result<()> {
        if payment.status != next && !payment.status.can_transition_to(next) {
            return Err(AppError::state(format!(
                "Payment '{}' cannot move from {} to {}",
                payment.id, payment.status, next
            )));
        }
        payment.status = next;
        Ok(())
    }

    fn matching(&self, filters: &PaymentFilters) -> Vec<Payment> {
        let mut found: Vec<Payment> = self
            .payments
            .iter()
            .filter(|entry| filters.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn create(&self, new: NewPayment) -> Result<Payment> {
        let now = Utc::now();
        let payment = Payment {
            id: uuid::Uuid::new_v4().to_string(),
            status: PaymentStatus::Processing,
            gateway: new.gateway,
            amount: new.amount,
            currency: new.currency,
            payment_method: new.payment_method,
            customer_id: new.customer_id,
            order_id: new.order_id,
            description: new.description,
            transaction_id: None,
            authorization_id: None,
            captured_amount: None,
            gateway_response: None,
            failure_reason: None,
            cancellation_reason: None,
            refunds: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.payments.insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Payment>> {
        Ok(self.payments.get(id).map(|p| p.value().clone()))
    }

    async fn update_status(&self, id: &str, update: StatusUpdate) -> Result<Payment> {
        self.mutate(id, |payment| {
            if let Some(expected) = update.expected_version {
                if payment.version != expected {
                    return Err(AppError::state(format!(
                        "Payment '{}' was modified concurrently (expected version {}, found {})",
                        payment.id, expected, payment.version
                    )));
                }
            }
            Self::transition(payment, update.status)?;
            if update.transaction_id.is_some() {
                payment.transaction_id = update.transaction_id;
            }
            if update.authorization_id.is_some() {
                payment.authorization_id = update.authorization_id;
            }
            if update.gateway_response.is_some() {
                payment.gateway_response = update.gateway_response;
            }
            Ok(())
        })
    }

    async fn mark_as_failed(&self, id: &str, reason: &str) -> Result<Payment> {
        self.mutate(id, |payment| {
            Self::transition(payment, PaymentStatus::Failed)?;
            payment.failure_reason = Some(reason.to_string());
            Ok(())
        })
    }

    async fn mark_as_captured(
        &self,
        id: &str,
        amount: Decimal,
        gateway_response: Option<serde_json::Value>,
    ) -> Result<Payment> {
        self.mutate(id, |payment| {
            if amount <= Decimal::ZERO || amount > payment.amount {
                return Err(AppError::validation(format!(
                    "Capture amount {} must be within (0, {}]",
                    amount, payment.amount
                )));
            }
            Self::transition(payment, PaymentStatus::Captured)?;
            payment.captured_amount = Some(amount);
            if gateway_response.is_some() {
                payment.gateway_response = gateway_response;
            }
            Ok(())
        })
    }

    async fn mark_as_cancelled(&self, id: &str, reason: &str) -> Result<Payment> {
        self.mutate(id, |payment| {
            Self::transition(payment, PaymentStatus::Cancelled)?;
            payment.cancellation_reason = Some(reason.to_string());
            Ok(())
        })
    }

    async fn mark_as_refunded(&self, id: &str) -> Result<Payment> {
        self.mutate(id, |payment| Self::transition(payment, PaymentStatus::Refunded))
    }

    async fn add_refund(&self, id: &str, refund: Refund) -> Result<Payment> {
        self.mutate(id, |payment| {
            if !payment.status.is_refundable() {
                return Err(AppError::state(format!(
                    "Payment '{}' is {} and cannot be refunded",
                    payment.id, payment.status
                )));
            }
            if refund.amount <= Decimal::ZERO {
                return Err(AppError::validation("Refund amount must be greater than zero"));
            }
            let refundable = payment.refundable_amount();
            if refund.amount > refundable {
                return Err(AppError::state(format!(
                    "Refund of {} exceeds refundable balance {}",
                    refund.amount, refundable
                )));
            }
            payment.refunds.push(refund);
            Ok(())
        })
    }

    async fn get_total_refunded(&self, id: &str) -> Result<Decimal> {
        self.payments
            .get(id)
            .map(|p| p.total_refunded())
            .ok_or_else(|| AppError::not_found(format!("Payment '{}' not found", id)))
    }

    async fn get_statistics(&self, filters: &PaymentFilters) -> Result<PaymentStatistics> {
        let payments = self.matching(filters);
        Ok(PaymentStatistics::from_payments(&payments))
    }

    async fn find_by_filters(&self, filters: &PaymentFilters) -> Result<Vec<Payment>> {
        let mut payments = self.matching(filters);
        if let Some(limit) = filters.limit {
            payments.truncate(limit);
        }
        Ok(payments)
    }
}
