//! Canonical rate quote.

use fxledger_common::{Currency, CurrencyPair};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rate and fee for one currency pair, as returned by the oracle.
///
/// `fee_bps` is the fee in basis points of the converted amount
/// (25 => 0.25%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    pub source: Currency,
    pub target: Currency,
    pub rate: Decimal,
    pub fee_bps: u32,
    #[serde(default)]
    pub provider: String,
}

impl RateQuote {
    /// Create a new quote.
    pub fn new(
        source: Currency,
        target: Currency,
        rate: Decimal,
        fee_bps: u32,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            rate,
            fee_bps,
            provider: provider.into(),
        }
    }

    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.source.clone(), self.target.clone())
    }
}
