//! Mock rate oracle for testing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use fxledger_common::CurrencyPair;
use rust_decimal::Decimal;

use crate::client::RateOracle;
use crate::error::{RateError, RateResult};
use crate::quote::RateQuote;

/// Failure a [`MockRateOracle`] returns for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Unavailable,
    Status(u16),
    Decode,
}

/// Oracle answering from an in-memory table.
#[derive(Default)]
pub struct MockRateOracle {
    rates: DashMap<String, RateQuote>,
    failures: DashMap<String, MockFailure>,
    delay_ms: AtomicU64,
    calls: AtomicU64,
}

impl MockRateOracle {
    /// Create a new mock oracle with no rates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a rate for a currency pair.
    pub fn set_rate(&self, source: &str, target: &str, rate: Decimal, fee_bps: u32) {
        let quote = RateQuote::new(source.into(), target.into(), rate, fee_bps, "mock");
        self.failures.remove(&quote.pair().key());
        self.rates.insert(quote.pair().key(), quote);
    }

    /// Make lookups for a pair fail.
    pub fn fail_pair(&self, source: &str, target: &str, failure: MockFailure) {
        let pair = CurrencyPair::new(source.into(), target.into());
        self.failures.insert(pair.key(), failure);
    }

    /// Delay every lookup.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of lookups served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RateOracle for MockRateOracle {
    async fn lookup_rate(&self, pair: &CurrencyPair) -> RateResult<RateQuote> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let delay_ms = self.delay_ms.load(Ordering::Relaxed);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let key = pair.key();
        if let Some(failure) = self.failures.get(&key).map(|f| *f) {
            return Err(match failure {
                MockFailure::Unavailable => RateError::Unavailable("mock oracle down".to_string()),
                MockFailure::Status(code) => RateError::Status { code },
                MockFailure::Decode => RateError::Decode("mock garbage".to_string()),
            });
        }

        let quote = self
            .rates
            .get(&key)
            .map(|q| q.clone())
            .ok_or_else(|| RateError::InvalidPair(pair.clone()))?;

        if quote.rate <= Decimal::ZERO {
            return Err(RateError::NonPositiveRate {
                pair: pair.clone(),
                rate: quote.rate,
            });
        }

        Ok(quote)
    }
}
