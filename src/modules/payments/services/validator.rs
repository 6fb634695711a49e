use chrono::{Datelike, Utc};

use crate::core::{AppError, Result};
use crate::modules::payments::models::CardDetails;

/// Checks card-shaped input before anything is sent to a gateway
pub trait CardValidator: Send + Sync {
    fn validate(&self, card: &CardDetails) -> Result<()>;
}

/// Structural card checks: Luhn, expiry, CVV and holder name
#[derive(Debug, Default, Clone)]
pub struct BasicCardValidator;

impl BasicCardValidator {
    pub fn new() -> Self {
        Self
    }
}

impl CardValidator for BasicCardValidator {
    fn validate(&self, card: &CardDetails) -> Result<()> {
        let digits: String = card.number.chars().filter(|c| !c.is_whitespace()).collect();
        if !(13..=19).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::validation("card number must be 13 to 19 digits"));
        }
        if !luhn_valid(&digits) {
            return Err(AppError::validation("card number failed checksum"));
        }

        if !(1..=12).contains(&card.exp_month) {
            return Err(AppError::validation("card expiry month must be 1 to 12"));
        }
        let today = Utc::now().date_naive();
        if (card.exp_year, card.exp_month) < (today.year(), today.month()) {
            return Err(AppError::validation("card has expired"));
        }

        let cvv = card.cvv.trim();
        if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::validation("card CVV must be 3 or 4 digits"));
        }

        if card.holder_name.trim().is_empty() {
            return Err(AppError::validation("card holder name is required"));
        }

        Ok(())
    }
}

fn luhn_valid(digits: &str) -> bool {
    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
