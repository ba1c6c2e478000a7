//! Currency and amount types.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ExchangeError;

/// Decimal places kept for stored amounts (balances, fees, target amounts).
pub const AMOUNT_SCALE: u32 = 8;

/// Divisor turning basis points into a fraction.
pub const BPS_DIVISOR: u32 = 10_000;

/// Round an amount to the stored scale, half away from zero.
pub fn round_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// ISO 4217 style currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code. The code is upper-cased but not validated.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Parse and validate a currency code: exactly three ASCII letters,
    /// case-insensitive.
    pub fn parse(code: &str) -> Result<Self, ExchangeError> {
        let currency = Self::new(code);
        if !currency.is_valid() {
            return Err(ExchangeError::validation(
                format!("currency code must be 3 letters, got {:?}", code),
                "currency",
            ));
        }
        Ok(currency)
    }

    /// Check the code shape.
    pub fn is_valid(&self) -> bool {
        self.0.len() == 3 && self.0.chars().all(|c| c.is_ascii_alphabetic())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// An ordered currency pair for rate lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Currency being sold.
    pub source: Currency,
    /// Currency being bought.
    pub target: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(source: Currency, target: Currency) -> Self {
        Self { source, target }
    }

    /// Key in `SRC:TGT` form.
    pub fn key(&self) -> String {
        format!("{}:{}", self.source, self.target)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.target)
    }
}
