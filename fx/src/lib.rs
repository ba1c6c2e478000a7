//! fxledger Rate Oracle
//!
//! Client for the external rate lookup service and the fee arithmetic applied
//! to its quotes.
//!
//! # Features
//!
//! - Proxy-style request envelope, pluggable [`RateTransport`]
//! - Enveloped-or-raw response decoding
//! - Static in-process rate service for local runs
//! - Decimal fee computation rounded to the stored scale
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fxledger_fx::{Conversion, RateOracle, RateOracleClient, StaticRateService};
//! use fxledger_common::{Currency, CurrencyPair};
//!
//! let oracle = RateOracleClient::new(Arc::new(StaticRateService::new()));
//! let quote = oracle.lookup_rate(&CurrencyPair::new(Currency::usd(), Currency::eur())).await?;
//! let conversion = Conversion::compute(dec!(100), &quote)?;
//! assert_eq!(conversion.target_amount, dec!(89.73));
//! ```

pub mod client;
pub mod conversion;
pub mod decode;
pub mod error;
pub mod quote;
pub mod transport;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use client::{RateOracle, RateOracleClient};
pub use conversion::Conversion;
pub use decode::{decode_response, ProxyRequest, ProxyResponse};
pub use error::{RateError, RateResult};
pub use quote::RateQuote;
pub use transport::{
    HttpRateTransport, RateTransport, StaticOverride, StaticRateService, DEFAULT_OVERRIDE_FEE_BPS,
};
#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockFailure, MockRateOracle};
