//! Order totals with currency information.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An order total with its ISO 4217 currency code.
///
/// The currency code is kept as the string the platform sent (`"PKR"`,
/// `"USD"`, ...) rather than a closed enum - tenants onboard storefronts in
/// arbitrary markets and an unknown code must never fail ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (e.g. rupees, not paisa).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: String,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
