//! Rate oracle client.

use std::sync::Arc;

use async_trait::async_trait;
use fxledger_common::CurrencyPair;
use tracing::{debug, instrument, warn};

use crate::decode::{decode_response, ProxyRequest};
use crate::error::{RateError, RateResult};
use crate::quote::RateQuote;
use crate::transport::RateTransport;

/// Source of `(rate, fee_bps)` quotes.
#[async_trait]
pub trait RateOracle: Send + Sync {
    /// Look up the rate for a pair. A returned quote always has a positive
    /// rate.
    async fn lookup_rate(&self, pair: &CurrencyPair) -> RateResult<RateQuote>;
}

/// Oracle client over a [`RateTransport`].
pub struct RateOracleClient {
    transport: Arc<dyn RateTransport>,
}

impl RateOracleClient {
    /// Create a new client.
    pub fn new(transport: Arc<dyn RateTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl RateOracle for RateOracleClient {
    #[instrument(skip(self), fields(pair = %pair, transport = self.transport.name()))]
    async fn lookup_rate(&self, pair: &CurrencyPair) -> RateResult<RateQuote> {
        let request = ProxyRequest::rate_lookup(pair);

        let payload = match self.transport.invoke(&request).await {
            Ok(payload) => payload,
            Err(RateError::Status { code: 404 }) => return Err(RateError::InvalidPair(pair.clone())),
            Err(e) => {
                warn!(error = %e, "Rate lookup failed");
                return Err(e);
            }
        };

        let quote = decode_response(pair, &payload)?;
        debug!(rate = %quote.rate, fee_bps = quote.fee_bps, provider = %quote.provider, "Got rate");

        Ok(quote)
    }
}
