use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::services::load_balancer::SelectionCriteria;

/// Payment instrument family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    BankTransfer,
    Ewallet,
    VirtualAccount,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
        PaymentMethod::BankTransfer,
        PaymentMethod::Ewallet,
        PaymentMethod::VirtualAccount,
    ];

    /// Card-based methods carry card details that must pass the validator
    pub fn is_card(self) -> bool {
        matches!(self, PaymentMethod::CreditCard | PaymentMethod::DebitCard)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Ewallet => "ewallet",
            PaymentMethod::VirtualAccount => "virtual_account",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "credit_card" | "card" => Ok(PaymentMethod::CreditCard),
            "debit_card" => Ok(PaymentMethod::DebitCard),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "ewallet" | "e_wallet" => Ok(PaymentMethod::Ewallet),
            "virtual_account" => Ok(PaymentMethod::VirtualAccount),
            _ => Err(format!("Invalid payment method: {}", s)),
        }
    }
}

/// Card details for card-based methods
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub exp_month: u32,
    pub exp_year: i32,
    #[serde(skip_serializing)]
    pub cvv: String,
    pub holder_name: String,
}

impl CardDetails {
    /// Last four digits, safe for logs
    pub fn last4(&self) -> &str {
        let digits = self.number.trim();
        if digits.len() >= 4 {
            &digits[digits.len() - 4..]
        } else {
            digits
        }
    }
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &format!("****{}", self.last4()))
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .field("holder_name", &self.holder_name)
            .finish()
    }
}

/// Input for `process_payment` / `authorize_payment`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub currency: Currency,

    /// Required; `None` is rejected by validation
    pub payment_method: Option<PaymentMethod>,

    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub description: Option<String>,
    pub card: Option<CardDetails>,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PaymentRequest {
    pub fn new(amount: Decimal, currency: Currency, payment_method: PaymentMethod) -> Self {
        Self {
            amount,
            currency,
            payment_method: Some(payment_method),
            customer_id: None,
            order_id: None,
            description: None,
            card: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_card(mut self, card: CardDetails) -> Self {
        self.card = Some(card);
        self
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    /// Required-field checks that do not depend on any gateway
    pub fn validate(&self) -> Result<PaymentMethod> {
        if self.amount <= Decimal::ZERO {
            return Err(AppError::validation("amount must be greater than zero"));
        }

        let method = self
            .payment_method
            .ok_or_else(|| AppError::validation("payment_method is required"))?;

        if method.is_card() && self.card.is_none() {
            return Err(AppError::validation(format!(
                "card details are required for {}",
                method
            )));
        }

        Ok(method)
    }

    /// Criteria used by gateway selection; call after `validate`
    pub fn criteria(&self, method: PaymentMethod) -> SelectionCriteria {
        SelectionCriteria {
            payment_method: method,
            currency: self.currency,
            amount: self.amount,
        }
    }
}
