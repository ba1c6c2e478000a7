//! Conversion job types and state machine.

use crate::{Currency, ExchangeError, JobId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job status representing the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted and waiting to be converted.
    Queued,
    /// Converted, balances and ledger updated.
    Completed,
    /// Recorded business failure (e.g. insufficient funds).
    Failed,
}

impl JobStatus {
    /// Check if this is a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Get valid next states from current state.
    pub fn valid_transitions(&self) -> &[JobStatus] {
        match self {
            JobStatus::Queued => &[JobStatus::Completed, JobStatus::Failed],
            JobStatus::Completed => &[],
            JobStatus::Failed => &[],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status {:?}", other)),
        }
    }
}

/// Why a job ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Source balance lower than the requested amount.
    InsufficientFunds,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InsufficientFunds => "insufficient_funds",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insufficient_funds" => Ok(FailureReason::InsufficientFunds),
            other => Err(format!("unknown failure reason {:?}", other)),
        }
    }
}

/// A conversion request as submitted by a caller, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    #[serde(alias = "client_id")]
    pub user_id: String,
    pub source_currency: String,
    pub target_currency: String,
    pub source_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl ConversionRequest {
    /// Create a request without an idempotency key.
    pub fn new(
        user_id: impl Into<String>,
        source_currency: impl Into<String>,
        target_currency: impl Into<String>,
        source_amount: Decimal,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            source_currency: source_currency.into(),
            target_currency: target_currency.into(),
            source_amount,
            idempotency_key: None,
        }
    }

    /// Attach an idempotency key.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Validate and normalize into a [`ConversionOrder`].
    pub fn validate(&self) -> Result<ConversionOrder, ExchangeError> {
        let user_id = UserId::new(self.user_id.trim());
        if !user_id.is_valid() {
            return Err(ExchangeError::validation("user_id is required", "user_id"));
        }

        let source_currency = Currency::parse(&self.source_currency).map_err(|_| {
            ExchangeError::validation("source_currency must be a 3-letter code", "source_currency")
        })?;
        let target_currency = Currency::parse(&self.target_currency).map_err(|_| {
            ExchangeError::validation("target_currency must be a 3-letter code", "target_currency")
        })?;
        if source_currency == target_currency {
            return Err(ExchangeError::validation(
                "source_currency and target_currency must differ",
                "target_currency",
            ));
        }

        if self.source_amount <= Decimal::ZERO {
            return Err(ExchangeError::validation(
                "source_amount must be > 0",
                "source_amount",
            ));
        }

        let idempotency_key = match self.idempotency_key.as_deref().map(str::trim) {
            Some("") => {
                return Err(ExchangeError::validation(
                    "idempotency_key must not be blank",
                    "idempotency_key",
                ))
            }
            other => other.map(str::to_string),
        };

        Ok(ConversionOrder {
            user_id,
            source_currency,
            target_currency,
            source_amount: self.source_amount.normalize(),
            idempotency_key,
        })
    }
}

/// A validated conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOrder {
    pub user_id: UserId,
    pub source_currency: Currency,
    pub target_currency: Currency,
    pub source_amount: Decimal,
    pub idempotency_key: Option<String>,
}

/// A conversion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: JobId,
    pub user_id: UserId,
    pub source_currency: Currency,
    pub target_currency: Currency,
    pub source_amount: Decimal,
    pub idempotency_key: Option<String>,
    pub status: JobStatus,
    pub target_amount: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub failure_reason: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ConversionJob {
    /// Create a queued job from a validated order.
    pub fn queued(order: ConversionOrder) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            user_id: order.user_id,
            source_currency: order.source_currency,
            target_currency: order.target_currency,
            source_amount: order.source_amount,
            idempotency_key: order.idempotency_key,
            status: JobStatus::Queued,
            target_amount: None,
            rate: None,
            fee: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Apply a terminal transition.
    pub fn apply(&mut self, transition: &JobTransition) -> Result<(), ExchangeError> {
        let next = transition.status();
        if !self.status.can_transition_to(next) {
            return Err(ExchangeError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        match transition {
            JobTransition::Completed {
                target_amount,
                rate,
                fee,
                completed_at,
            } => {
                self.target_amount = Some(*target_amount);
                self.rate = Some(*rate);
                self.fee = Some(*fee);
                self.completed_at = Some(*completed_at);
                self.updated_at = *completed_at;
            }
            JobTransition::Failed { reason, failed_at } => {
                self.failure_reason = Some(*reason);
                self.updated_at = *failed_at;
            }
        }

        Ok(())
    }
}

/// The single mutation a job receives after creation.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    Completed {
        target_amount: Decimal,
        rate: Decimal,
        fee: Decimal,
        completed_at: DateTime<Utc>,
    },
    Failed {
        reason: FailureReason,
        failed_at: DateTime<Utc>,
    },
}

impl JobTransition {
    /// Status the job ends up in.
    pub fn status(&self) -> JobStatus {
        match self {
            JobTransition::Completed { .. } => JobStatus::Completed,
            JobTransition::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Response returned by job creation, echoing the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReceipt {
    pub job_id: JobId,
    pub status: JobStatus,
    pub user_id: UserId,
    pub source_currency: Currency,
    pub target_currency: Currency,
    pub source_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&ConversionJob> for JobReceipt {
    fn from(job: &ConversionJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            user_id: job.user_id.clone(),
            source_currency: job.source_currency.clone(),
            target_currency: job.target_currency.clone(),
            source_amount: job.source_amount,
            idempotency_key: job.idempotency_key.clone(),
            created_at: job.created_at,
        }
    }
}

/// Job reference carried by the dispatch channel.
///
/// The consumer only trusts `job_id`; everything else is reloaded from the
/// store under lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    #[serde(alias = "client_id")]
    pub user_id: UserId,
    pub source_currency: Currency,
    pub target_currency: Currency,
    pub source_amount: Decimal,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&ConversionJob> for JobMessage {
    fn from(job: &ConversionJob) -> Self {
        Self {
            job_id: job.id,
            user_id: job.user_id.clone(),
            source_currency: job.source_currency.clone(),
            target_currency: job.target_currency.clone(),
            source_amount: job.source_amount,
            created_at: Some(job.created_at),
        }
    }
}
