//! Rate oracle error types.

use fxledger_common::{CurrencyPair, ExchangeError};
use thiserror::Error;

/// Errors that can occur while looking up or applying a rate.
#[derive(Debug, Error)]
pub enum RateError {
    /// Transport failed before a response was received.
    #[error("Rate oracle unavailable: {0}")]
    Unavailable(String),

    /// Oracle does not quote the pair.
    #[error("Rate not available for {0}")]
    InvalidPair(CurrencyPair),

    /// Oracle answered with a non-success status.
    #[error("Rate oracle returned status {code}")]
    Status { code: u16 },

    /// Response matched neither the enveloped nor the raw shape.
    #[error("Rate decode error: {0}")]
    Decode(String),

    /// Quoted rate is zero or negative.
    #[error("Non-positive rate {rate} for {pair}")]
    NonPositiveRate {
        pair: CurrencyPair,
        rate: rust_decimal::Decimal,
    },

    /// Quoted fee exceeds the whole amount.
    #[error("Fee of {fee_bps} bps for {pair} exceeds 10000")]
    FeeOutOfRange { pair: CurrencyPair, fee_bps: u32 },

    /// Applying the quote overflows the decimal range.
    #[error("Conversion overflow: {0}")]
    Overflow(String),

    /// Applying the quote yields a zero or negative target amount.
    #[error("Computed non-positive target amount: {0}")]
    NonPositiveAmount(String),
}

/// Result type for rate operations.
pub type RateResult<T> = Result<T, RateError>;

impl From<RateError> for ExchangeError {
    fn from(err: RateError) -> Self {
        match err {
            RateError::Unavailable(message) => ExchangeError::RateUnavailable(message),
            RateError::InvalidPair(pair) => ExchangeError::InvalidPair {
                source_currency: pair.source.to_string(),
                target_currency: pair.target.to_string(),
            },
            RateError::Status { code } => ExchangeError::RateRejected { status: code },
            RateError::Decode(message) => ExchangeError::RateDecode(message),
            e @ RateError::NonPositiveRate { .. } => ExchangeError::InvalidRate(e.to_string()),
            e @ RateError::FeeOutOfRange { .. } => ExchangeError::InvalidRate(e.to_string()),
            e @ RateError::Overflow(_) => ExchangeError::InvalidComputedAmount(e.to_string()),
            RateError::NonPositiveAmount(message) => ExchangeError::InvalidComputedAmount(message),
        }
    }
}
