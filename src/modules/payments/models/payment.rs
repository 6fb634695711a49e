use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::Currency;

use super::payment_request::PaymentMethod;

/// Payment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Submitted to a gateway, no terminal response yet
    Processing,
    /// Funds held, awaiting capture or cancellation
    Authorized,
    /// Authorization converted into a charge
    Captured,
    /// Direct sale settled in one step
    Paid,
    /// Gateway rejected or every attempt was exhausted
    Failed,
    /// Authorization released
    Cancelled,
    /// Fully refunded
    Refunded,
    /// Gateway returned a state the orchestrator could not interpret
    Error,
}

impl PaymentStatus {
    /// Legal lifecycle edges
    ///
    /// processing -> authorized | paid | failed | error
    /// authorized -> captured | cancelled
    /// captured | paid -> refunded
    /// error -> paid | failed (reconciliation only)
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Processing, Authorized)
                | (Processing, Paid)
                | (Processing, Failed)
                | (Processing, Error)
                | (Authorized, Captured)
                | (Authorized, Cancelled)
                | (Captured, Refunded)
                | (Paid, Refunded)
                | (Error, Paid)
                | (Error, Failed)
        )
    }

    pub fn is_refundable(self) -> bool {
        matches!(self, PaymentStatus::Captured | PaymentStatus::Paid)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Processing => "processing",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "processing" | "pending" => Ok(PaymentStatus::Processing),
            "authorized" => Ok(PaymentStatus::Authorized),
            "captured" => Ok(PaymentStatus::Captured),
            "paid" | "completed" | "succeeded" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" | "canceled" | "voided" => Ok(PaymentStatus::Cancelled),
            "refunded" => Ok(PaymentStatus::Refunded),
            "error" => Ok(PaymentStatus::Error),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

/// Refund record, always attached to exactly one payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: Decimal,
    pub reason: String,
    pub gateway_refund_id: String,
    pub created_at: DateTime<Utc>,
}

impl Refund {
    pub fn new(amount: Decimal, reason: impl Into<String>, gateway_refund_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            amount,
            reason: reason.into(),
            gateway_refund_id,
            created_at: Utc::now(),
        }
    }
}

/// Canonical payment record
///
/// The repository owns the stored copy; the orchestrator only reads it and
/// asks the repository to apply transitions. `version` increments on every
/// write so concurrent writers can detect lost updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub status: PaymentStatus,
    pub gateway: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub description: Option<String>,

    /// Gateway's transaction reference
    pub transaction_id: Option<String>,

    /// Present only once the payment has been authorized
    pub authorization_id: Option<String>,

    pub captured_amount: Option<Decimal>,

    /// Raw gateway payload from the last terminal response
    pub gateway_response: Option<serde_json::Value>,

    pub failure_reason: Option<String>,

    /// Why an authorization hold was released
    pub cancellation_reason: Option<String>,
    pub refunds: Vec<Refund>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Total of every refund recorded so far
    pub fn total_refunded(&self) -> Decimal {
        self.refunds.iter().map(|r| r.amount).sum()
    }

    /// Amount that can still be refunded, never negative
    pub fn refundable_amount(&self) -> Decimal {
        (self.settled_amount() - self.total_refunded()).max(Decimal::ZERO)
    }

    /// Amount actually charged: the captured amount for partial captures,
    /// otherwise the full payment amount
    pub fn settled_amount(&self) -> Decimal {
        self.captured_amount.unwrap_or(self.amount)
    }

    pub fn is_fully_refunded(&self) -> bool {
        self.total_refunded() >= self.settled_amount()
    }
}
