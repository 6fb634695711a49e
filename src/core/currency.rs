use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported settlement currencies with their decimal precision rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Indonesian Rupiah (no decimal places)
    IDR,
    /// Japanese Yen (no decimal places)
    JPY,
    /// Malaysian Ringgit (2 decimal places)
    MYR,
    /// US Dollar (2 decimal places)
    USD,
    /// Euro (2 decimal places)
    EUR,
    /// Pound Sterling (2 decimal places)
    GBP,
}

impl Currency {
    pub const ALL: [Currency; 6] = [
        Currency::IDR,
        Currency::JPY,
        Currency::MYR,
        Currency::USD,
        Currency::EUR,
        Currency::GBP,
    ];

    /// Returns the decimal scale for this currency
    pub fn scale(&self) -> u32 {
        match self {
            Currency::IDR | Currency::JPY => 0,
            Currency::MYR | Currency::USD | Currency::EUR | Currency::GBP => 2,
        }
    }

    /// Validates that a payable amount is positive and has the correct scale
    pub fn validate_amount(&self, amount: Decimal) -> Result<(), String> {
        if amount <= Decimal::ZERO {
            return Err(format!("{} amount must be greater than zero", self));
        }

        let expected_scale = self.scale();
        if amount.normalize().scale() > expected_scale {
            return Err(format!(
                "{} amounts must have at most {} decimal places, got {}",
                self,
                expected_scale,
                amount.normalize().scale()
            ));
        }

        Ok(())
    }

    /// Formats an amount for display with the correct decimal places
    pub fn format_amount(&self, amount: Decimal) -> String {
        let scale = self.scale();
        if scale == 0 {
            format!("{} {}", self, amount.round_dp(0))
        } else {
            format!("{} {:.width$}", self, amount, width = scale as usize)
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Currency::IDR => "IDR",
            Currency::JPY => "JPY",
            Currency::MYR => "MYR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
        };
        f.write_str(code)
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IDR" => Ok(Currency::IDR),
            "JPY" => Ok(Currency::JPY),
            "MYR" => Ok(Currency::MYR),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            _ => Err(format!("Invalid currency: {}", s)),
        }
    }
}
