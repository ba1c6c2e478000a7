//! Transports carrying oracle requests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use fxledger_common::Currency;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::debug;

use crate::decode::{ProxyRequest, ProxyResponse};
use crate::error::{RateError, RateResult};
use crate::quote::RateQuote;

/// Delivers a proxy request to the oracle and returns the raw response bytes.
#[async_trait]
pub trait RateTransport: Send + Sync {
    /// Transport name for logs.
    fn name(&self) -> &str;

    /// Send the request. Only failures to obtain a response are errors here.
    async fn invoke(&self, request: &ProxyRequest) -> RateResult<Vec<u8>>;
}

/// Posts the request envelope as JSON to an HTTP endpoint.
pub struct HttpRateTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpRateTransport {
    /// Create a new HTTP transport with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> RateResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RateError::Unavailable(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RateTransport for HttpRateTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn invoke(&self, request: &ProxyRequest) -> RateResult<Vec<u8>> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| RateError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RateError::Status {
                code: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RateError::Unavailable(e.to_string()))?;
        debug!(status = status.as_u16(), bytes = body.len(), "Rate oracle responded");

        Ok(body.to_vec())
    }
}

/// Fallback quote for pairs missing from the static table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticOverride {
    pub rate: Decimal,
    pub fee_bps: u32,
}

/// In-process rate service answering from a fixed table.
pub struct StaticRateService {
    rates: HashMap<String, RateQuote>,
    fallback: Option<StaticOverride>,
}

/// Default fee for the static override when none is configured.
pub const DEFAULT_OVERRIDE_FEE_BPS: u32 = 25;

const TABLE_FEE_BPS: u32 = 30;
const TABLE_PROVIDER: &str = "mock-fx";
const OVERRIDE_PROVIDER: &str = "env-mock";

impl StaticRateService {
    /// Service with the built-in table. Pairs are not strict inverses.
    pub fn new() -> Self {
        let table = [
            ("USD", "EUR", Decimal::new(90, 2)),
            ("EUR", "USD", Decimal::new(116, 2)),
            ("USD", "GBP", Decimal::new(126, 2)),
            ("GBP", "USD", Decimal::new(79, 2)),
            ("EUR", "GBP", Decimal::new(116, 2)),
            ("GBP", "EUR", Decimal::new(90, 2)),
        ];

        let rates = table
            .into_iter()
            .map(|(source, target, rate)| {
                let quote = RateQuote::new(
                    Currency::new(source),
                    Currency::new(target),
                    rate,
                    TABLE_FEE_BPS,
                    TABLE_PROVIDER,
                );
                (format!("{}:{}", source, target), quote)
            })
            .collect();

        Self {
            rates,
            fallback: None,
        }
    }

    /// Quote unknown pairs at a fixed rate.
    pub fn with_override(mut self, fallback: StaticOverride) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Answer a request in the enveloped shape.
    pub fn handle(&self, request: &ProxyRequest) -> ProxyResponse {
        let mut source = request.query("source").unwrap_or_default().to_uppercase();
        let mut target = request.query("target").unwrap_or_default().to_uppercase();

        if source.is_empty() || target.is_empty() {
            if let Some(body) = request.body.as_deref() {
                let parsed: serde_json::Value =
                    serde_json::from_str(body).unwrap_or(serde_json::Value::Null);
                if let Some(s) = parsed["source"].as_str().filter(|s| !s.is_empty()) {
                    source = s.to_uppercase();
                }
                if let Some(t) = parsed["target"].as_str().filter(|t| !t.is_empty()) {
                    target = t.to_uppercase();
                }
            }
        }

        if !Currency::new(&source).is_valid() || !Currency::new(&target).is_valid() {
            return error_response(400, "source/target must be 3-letter codes");
        }

        let key = format!("{}:{}", source, target);
        let quote = self.rates.get(&key).cloned().or_else(|| {
            self.fallback.as_ref().map(|f| {
                RateQuote::new(
                    Currency::new(&source),
                    Currency::new(&target),
                    f.rate,
                    f.fee_bps,
                    OVERRIDE_PROVIDER,
                )
            })
        });

        match quote {
            Some(quote) => match serde_json::to_string(&quote) {
                Ok(body) => ProxyResponse::json(200, body),
                Err(_) => error_response(500, "internal"),
            },
            None => error_response(404, "rate not found"),
        }
    }
}

impl Default for StaticRateService {
    fn default() -> Self {
        Self::new()
    }
}

fn error_response(status: u16, message: &str) -> ProxyResponse {
    ProxyResponse::json(status, json!({ "error": message }).to_string())
}

#[async_trait]
impl RateTransport for StaticRateService {
    fn name(&self) -> &str {
        "static"
    }

    async fn invoke(&self, request: &ProxyRequest) -> RateResult<Vec<u8>> {
        serde_json::to_vec(&self.handle(request)).map_err(|e| RateError::Decode(e.to_string()))
    }
}
