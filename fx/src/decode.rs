//! Oracle request and response shapes.
//!
//! The oracle sits behind a proxy-style request/response wrapper. A response
//! may arrive wrapped (`{statusCode, body, headers, isBase64Encoded}`) or as the
//! raw quote payload; both are accepted.

use std::collections::HashMap;

use fxledger_common::{CurrencyPair, BPS_DIVISOR};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{RateError, RateResult};
use crate::quote::RateQuote;

/// Proxy-style request sent to the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    pub resource: String,
    pub path: String,
    pub http_method: String,
    pub query_string_parameters: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl ProxyRequest {
    /// Build the `GET /rate?source=..&target=..` request for a pair.
    pub fn rate_lookup(pair: &CurrencyPair) -> Self {
        let mut query = HashMap::new();
        query.insert("source".to_string(), pair.source.code().to_string());
        query.insert("target".to_string(), pair.target.code().to_string());

        Self {
            resource: "/rate".to_string(),
            path: "/rate".to_string(),
            http_method: "GET".to_string(),
            query_string_parameters: query,
            headers: HashMap::new(),
            body: None,
            is_base64_encoded: false,
        }
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_string_parameters.get(name).map(String::as_str)
    }
}

/// Proxy-style response wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub body: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl ProxyResponse {
    /// JSON response with the given status.
    pub fn json(status_code: u16, body: String) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        Self {
            status_code,
            body,
            headers,
            is_base64_encoded: false,
        }
    }
}

/// Raw quote payload.
#[derive(Debug, Clone, Deserialize)]
struct RatePayload {
    source: String,
    target: String,
    rate: Decimal,
    fee_bps: u32,
    #[serde(default)]
    provider: String,
}

/// Either accepted response shape. The wrapped variant is listed first so it
/// is tried first.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OracleResponse {
    Enveloped(ProxyResponse),
    Raw(RatePayload),
}

/// Decode an oracle response for `pair` into a validated quote.
pub fn decode_response(pair: &CurrencyPair, payload: &[u8]) -> RateResult<RateQuote> {
    let response: OracleResponse = serde_json::from_slice(payload)
        .map_err(|e| RateError::Decode(format!("neither enveloped nor raw rate payload: {}", e)))?;

    let raw = match response {
        OracleResponse::Enveloped(envelope) => unwrap_envelope(pair, envelope)?,
        OracleResponse::Raw(raw) => raw,
    };

    let quote = RateQuote::new(
        raw.source.as_str().into(),
        raw.target.as_str().into(),
        raw.rate,
        raw.fee_bps,
        raw.provider,
    );

    if quote.pair() != *pair {
        return Err(RateError::Decode(format!(
            "quote for {} answers a request for {}",
            quote.pair(),
            pair
        )));
    }

    if quote.rate <= Decimal::ZERO {
        return Err(RateError::NonPositiveRate {
            pair: pair.clone(),
            rate: quote.rate,
        });
    }

    if quote.fee_bps > BPS_DIVISOR {
        return Err(RateError::FeeOutOfRange {
            pair: pair.clone(),
            fee_bps: quote.fee_bps,
        });
    }

    Ok(quote)
}

fn unwrap_envelope(pair: &CurrencyPair, envelope: ProxyResponse) -> RateResult<RatePayload> {
    match envelope.status_code {
        200 => {}
        404 => return Err(RateError::InvalidPair(pair.clone())),
        code => return Err(RateError::Status { code }),
    }

    if envelope.is_base64_encoded {
        return Err(RateError::Decode("base64-encoded rate body".to_string()));
    }

    serde_json::from_str(&envelope.body)
        .map_err(|e| RateError::Decode(format!("rate body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxledger_common::Currency;
    use rust_decimal_macros::dec;

    fn usd_eur() -> CurrencyPair {
        CurrencyPair::new(Currency::usd(), Currency::eur())
    }

    #[test]
    fn test_decode_enveloped_response() {
        let payload = br#"{
            "statusCode": 200,
            "headers": {"Content-Type": "application/json"},
            "body": "{\"source\":\"USD\",\"target\":\"EUR\",\"rate\":0.9,\"fee_bps\":30,\"provider\":\"mock-fx\"}"
        }"#;

        let quote = decode_response(&usd_eur(), payload).unwrap();
        assert_eq!(quote.rate, dec!(0.9));
        assert_eq!(quote.fee_bps, 30);
        assert_eq!(quote.provider, "mock-fx");
    }

    #[test]
    fn test_decode_raw_response() {
        let payload = br#"{"source":"USD","target":"EUR","rate":"0.90","fee_bps":30,"provider":"x"}"#;

        let quote = decode_response(&usd_eur(), payload).unwrap();
        assert_eq!(quote.pair(), usd_eur());
        assert_eq!(quote.rate, dec!(0.90));
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = decode_response(&usd_eur(), b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, RateError::Decode(_)));

        let err = decode_response(&usd_eur(), br#"{"hello":"world"}"#).unwrap_err();
        assert!(matches!(err, RateError::Decode(_)));
    }

    #[test]
    fn test_envelope_with_unparseable_body() {
        let payload = br#"{"statusCode": 200, "body": "not json"}"#;
        let err = decode_response(&usd_eur(), payload).unwrap_err();
        assert!(matches!(err, RateError::Decode(_)));
    }

    #[test]
    fn test_envelope_status_mapping() {
        let not_found = br#"{"statusCode": 404, "body": "{\"error\":\"rate not found\"}"}"#;
        assert!(matches!(
            decode_response(&usd_eur(), not_found),
            Err(RateError::InvalidPair(_))
        ));

        let unavailable = br#"{"statusCode": 503, "body": ""}"#;
        assert!(matches!(
            decode_response(&usd_eur(), unavailable),
            Err(RateError::Status { code: 503 })
        ));
    }

    #[test]
    fn test_non_positive_rate_rejected() {
        let payload = br#"{"source":"USD","target":"EUR","rate":0,"fee_bps":30}"#;
        assert!(matches!(
            decode_response(&usd_eur(), payload),
            Err(RateError::NonPositiveRate { .. })
        ));
    }

    #[test]
    fn test_quote_for_other_pair_rejected() {
        let payload = br#"{"source":"USD","target":"GBP","rate":1.26,"fee_bps":30}"#;
        assert!(matches!(
            decode_response(&usd_eur(), payload),
            Err(RateError::Decode(_))
        ));

        let lowercase = br#"{"source":"usd","target":"eur","rate":0.9,"fee_bps":30}"#;
        assert!(decode_response(&usd_eur(), lowercase).is_ok());
    }

    #[test]
    fn test_fee_above_divisor_rejected() {
        let payload = br#"{"source":"USD","target":"EUR","rate":0.9,"fee_bps":4294967295}"#;
        assert!(matches!(
            decode_response(&usd_eur(), payload),
            Err(RateError::FeeOutOfRange { fee_bps: 4294967295, .. })
        ));

        let whole = br#"{"source":"USD","target":"EUR","rate":0.9,"fee_bps":10000}"#;
        assert_eq!(decode_response(&usd_eur(), whole).unwrap().fee_bps, 10_000);
    }

    #[test]
    fn test_rate_lookup_request_shape() {
        let request = ProxyRequest::rate_lookup(&usd_eur());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["httpMethod"], "GET");
        assert_eq!(json["path"], "/rate");
        assert_eq!(json["queryStringParameters"]["source"], "USD");
        assert_eq!(json["queryStringParameters"]["target"], "EUR");
    }
}
