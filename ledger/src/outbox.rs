//! Outbox records co-written with the state changes they announce.

use chrono::{DateTime, Utc};
use fxledger_common::{ConversionJob, Currency, FailureReason, JobId, JobStatus, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate type of every record written by the engine.
pub const AGGREGATE_TYPE: &str = "conversion_job";
/// Topic announcing newly queued jobs.
pub const JOBS_TOPIC: &str = "conversion-jobs";
/// Topic announcing terminal conversion outcomes.
pub const EVENTS_TOPIC: &str = "conversion-events";

/// An event waiting to be drained and published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: JobId,
    pub topic: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl OutboxRecord {
    /// Build a record for a job aggregate.
    pub fn for_job<P: Serialize>(
        job_id: JobId,
        topic: impl Into<String>,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::now_v7(),
            aggregate_type: AGGREGATE_TYPE.to_string(),
            aggregate_id: job_id,
            topic: topic.into(),
            payload: serde_json::to_value(payload)?,
            created_at: Utc::now(),
        })
    }
}

/// Terminal conversion outcome published on [`EVENTS_TOPIC`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ConversionEvent {
    #[serde(rename = "conversion.completed")]
    Completed {
        job_id: JobId,
        user_id: UserId,
        source_currency: Currency,
        target_currency: Currency,
        source_amount: Decimal,
        target_amount: Decimal,
        rate: Decimal,
        fee: Decimal,
    },
    #[serde(rename = "conversion.failed")]
    Failed {
        job_id: JobId,
        user_id: UserId,
        source_currency: Currency,
        target_currency: Currency,
        source_amount: Decimal,
        reason: FailureReason,
    },
}

impl ConversionEvent {
    /// Describe a job that has reached a terminal state.
    pub fn from_terminal_job(job: &ConversionJob) -> Option<Self> {
        match job.status {
            JobStatus::Queued => None,
            JobStatus::Completed => Some(ConversionEvent::Completed {
                job_id: job.id,
                user_id: job.user_id.clone(),
                source_currency: job.source_currency.clone(),
                target_currency: job.target_currency.clone(),
                source_amount: job.source_amount,
                target_amount: job.target_amount?,
                rate: job.rate?,
                fee: job.fee?,
            }),
            JobStatus::Failed => Some(ConversionEvent::Failed {
                job_id: job.id,
                user_id: job.user_id.clone(),
                source_currency: job.source_currency.clone(),
                target_currency: job.target_currency.clone(),
                source_amount: job.source_amount,
                reason: job.failure_reason?,
            }),
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            ConversionEvent::Completed { job_id, .. } | ConversionEvent::Failed { job_id, .. } => {
                *job_id
            }
        }
    }

    /// Wrap the event into an outbox record on [`EVENTS_TOPIC`].
    pub fn to_record(&self) -> Result<OutboxRecord, serde_json::Error> {
        OutboxRecord::for_job(self.job_id(), EVENTS_TOPIC, self)
    }
}
