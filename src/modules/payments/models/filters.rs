use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::Currency;

use super::payment::{Payment, PaymentStatus};

/// Query filters for reporting lookups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentFilters {
    pub status: Option<PaymentStatus>,
    pub gateway: Option<String>,
    pub currency: Option<Currency>,
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl PaymentFilters {
    pub fn matches(&self, payment: &Payment) -> bool {
        self.status.map_or(true, |s| payment.status == s)
            && self.gateway.as_deref().map_or(true, |g| payment.gateway == g)
            && self.currency.map_or(true, |c| payment.currency == c)
            && self
                .customer_id
                .as_deref()
                .map_or(true, |c| payment.customer_id.as_deref() == Some(c))
            && self
                .order_id
                .as_deref()
                .map_or(true, |o| payment.order_id.as_deref() == Some(o))
            && self.created_from.map_or(true, |from| payment.created_at >= from)
            && self.created_to.map_or(true, |to| payment.created_at < to)
    }
}

/// Aggregate view over a set of payments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentStatistics {
    pub total_count: usize,
    pub by_status: HashMap<PaymentStatus, usize>,
    pub by_gateway: HashMap<String, usize>,

    /// Sum of settled (paid or captured, including later refunded) amounts
    pub total_settled: Decimal,
    pub total_refunded: Decimal,
}

impl PaymentStatistics {
    pub fn from_payments<'a>(payments: impl IntoIterator<Item = &'a Payment>) -> Self {
        let mut stats = PaymentStatistics::default();
        for payment in payments {
            stats.total_count += 1;
            *stats.by_status.entry(payment.status).or_insert(0) += 1;
            *stats.by_gateway.entry(payment.gateway.clone()).or_insert(0) += 1;

            if matches!(
                payment.status,
                PaymentStatus::Paid | PaymentStatus::Captured | PaymentStatus::Refunded
            ) {
                stats.total_settled += payment.settled_amount();
            }
            stats.total_refunded += payment.total_refunded();
        }
        stats
    }

    /// Share of payments that settled, in [0, 1]
    pub fn success_rate(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let settled = [PaymentStatus::Paid, PaymentStatus::Captured, PaymentStatus::Refunded]
            .iter()
            .map(|s| self.by_status.get(s).copied().unwrap_or(0))
            .sum::<usize>();
        settled as f64 / self.total_count as f64
    }
}
