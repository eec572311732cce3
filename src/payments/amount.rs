//! Validated (currency, amount) pairs

use crate::error::{GatewayError, GatewayResult};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A positive amount in an ISO currency, rounded to two decimal places.
///
/// Construction either yields a fully validated value or an error; there is no
/// partially initialised amount. Sessions store `Option<PaymentAmount>` where the
/// gateway has not (yet) echoed an amount.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentAmount {
    currency: String,
    amount: Decimal,
}

impl PaymentAmount {
    pub fn new(currency: &str, amount: Decimal) -> GatewayResult<Self> {
        let currency = currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(GatewayError::invalid_amount("currency is required"));
        }

        let amount = Self::round(amount);
        if amount <= Decimal::ZERO {
            return Err(GatewayError::invalid_amount(format!(
                "amount must be positive, got {}",
                amount
            )));
        }

        Ok(Self { currency, amount })
    }

    /// Parses an amount echoed by the gateway as a string.
    pub fn parse(currency: &str, amount: &str) -> GatewayResult<Self> {
        let value = Decimal::from_str(amount.trim()).map_err(|e| {
            GatewayError::invalid_amount(format!("'{}' is not a decimal: {}", amount, e))
        })?;
        Self::new(currency, value)
    }

    /// Two decimal places, midpoint away from zero.
    pub fn round(amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Wire format used by every gateway request (`"107.02"`).
    pub fn formatted_amount(&self) -> String {
        format_decimal(self.amount)
    }
}

pub(crate) fn format_decimal(amount: Decimal) -> String {
    let mut value = PaymentAmount::round(amount);
    value.rescale(2);
    value.to_string()
}

impl PartialEq for PaymentAmount {
    fn eq(&self, other: &Self) -> bool {
        self.currency.eq_ignore_ascii_case(&other.currency) && self.amount == other.amount
    }
}

impl Eq for PaymentAmount {}

impl fmt::Display for PaymentAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.formatted_amount(), self.currency)
    }
}
