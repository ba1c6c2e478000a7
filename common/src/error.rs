//! Error types for the conversion engine.

use crate::{JobId, JobStatus};
use thiserror::Error;

/// How an error should be treated by callers and redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input, rejected before any transaction.
    Validation,
    /// Job or account absent.
    NotFound,
    /// Store or oracle unreachable; the job stays queued for redelivery.
    Transient,
    /// Retrying alone will not help; needs an upstream or operator fix.
    Fatal,
}

/// Main error type for conversion operations.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Invalid request content.
    #[error("Invalid request: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Unique constraint hit (e.g. idempotency key already used).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid state transition.
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// Ledger store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Rate oracle could not be reached.
    #[error("Rate oracle unavailable: {0}")]
    RateUnavailable(String),

    /// Rate oracle answered with a non-success status.
    #[error("Rate oracle returned status {status}")]
    RateRejected { status: u16 },

    /// Rate oracle does not know the pair.
    #[error("Invalid currency pair {source_currency}/{target_currency}")]
    InvalidPair {
        source_currency: String,
        target_currency: String,
    },

    /// Rate oracle response matched neither the enveloped nor the raw shape.
    #[error("Rate decode error: {0}")]
    RateDecode(String),

    /// Rate oracle returned an unusable rate.
    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    /// Computed target amount is zero or negative.
    #[error("Invalid computed amount: {0}")]
    InvalidComputedAmount(String),

    /// Job reference could not be handed to the dispatch path.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Operation deadline exceeded.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ExchangeError {
    /// Build a validation error for a field.
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        ExchangeError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Classify the error.
    pub fn class(&self) -> ErrorClass {
        match self {
            ExchangeError::Validation { .. } => ErrorClass::Validation,
            ExchangeError::JobNotFound(_) | ExchangeError::AccountNotFound(_) => {
                ErrorClass::NotFound
            }
            ExchangeError::Store(_)
            | ExchangeError::RateUnavailable(_)
            | ExchangeError::RateRejected { .. }
            | ExchangeError::Dispatch(_)
            | ExchangeError::Timeout(_) => ErrorClass::Transient,
            ExchangeError::Conflict(_)
            | ExchangeError::InvalidTransition { .. }
            | ExchangeError::InvalidPair { .. }
            | ExchangeError::RateDecode(_)
            | ExchangeError::InvalidRate(_)
            | ExchangeError::InvalidComputedAmount(_)
            | ExchangeError::Configuration(_) => ErrorClass::Fatal,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ExchangeError::Validation { .. } => "VALIDATION_ERROR",
            ExchangeError::JobNotFound(_) => "JOB_NOT_FOUND",
            ExchangeError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            ExchangeError::Conflict(_) => "CONFLICT",
            ExchangeError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ExchangeError::Store(_) => "STORE_ERROR",
            ExchangeError::RateUnavailable(_) => "RATE_UNAVAILABLE",
            ExchangeError::RateRejected { .. } => "RATE_REJECTED",
            ExchangeError::InvalidPair { .. } => "INVALID_PAIR",
            ExchangeError::RateDecode(_) => "RATE_DECODE_ERROR",
            ExchangeError::InvalidRate(_) => "INVALID_RATE",
            ExchangeError::InvalidComputedAmount(_) => "INVALID_COMPUTED_AMOUNT",
            ExchangeError::Dispatch(_) => "DISPATCH_ERROR",
            ExchangeError::Timeout(_) => "TIMEOUT",
            ExchangeError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;
