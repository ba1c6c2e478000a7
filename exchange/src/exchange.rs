//! Synchronous exchange path: intake and settlement in one transaction.

use std::sync::Arc;

use fxledger_common::{
    ConversionJob, ConversionRequest, Currency, ExchangeError, FailureReason, JobId, JobStatus,
    Result, UserId,
};
use fxledger_ledger::{LedgerStore, LedgerTx};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::context::ExchangeContext;
use crate::engine::EngineOutcome;

/// Terminal result returned to a synchronous caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub user_id: UserId,
    pub source_currency: Currency,
    pub target_currency: Currency,
    pub source_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

impl From<&ConversionJob> for ExchangeResult {
    fn from(job: &ConversionJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            user_id: job.user_id.clone(),
            source_currency: job.source_currency.clone(),
            target_currency: job.target_currency.clone(),
            source_amount: job.source_amount,
            target_amount: job.target_amount,
            rate: job.rate,
            fee: job.fee,
            failure_reason: job.failure_reason,
        }
    }
}

/// Converts inline instead of queueing.
pub struct SyncExchange<S: LedgerStore> {
    ctx: Arc<ExchangeContext<S>>,
}

impl<S: LedgerStore> SyncExchange<S> {
    /// Create a new synchronous exchange.
    pub fn new(ctx: Arc<ExchangeContext<S>>) -> Self {
        Self { ctx }
    }

    /// Create and settle a job in one transaction.
    ///
    /// No idempotency-key lookup happens here; a key already taken by another
    /// job is a conflict. Insufficient funds commits a `failed` job; any other
    /// error rolls back and leaves no job behind.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn exchange(&self, request: &ConversionRequest) -> Result<ExchangeResult> {
        let order = request.validate()?;
        let job = ConversionJob::queued(order);
        let job_id = job.id;

        let outcome = self
            .ctx
            .with_deadline("exchange", async {
                let mut tx = self.ctx.store().begin().await?;
                tx.insert_job(&job).await?;
                let outcome = self.ctx.engine().settle(&mut tx, job).await?;
                tx.commit().await?;
                Ok::<_, ExchangeError>(outcome)
            })
            .await;

        let metrics = self.ctx.metrics();
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics.job_errored();
                return Err(e);
            }
        };

        match &outcome {
            EngineOutcome::Completed(_) => metrics.job_completed(),
            EngineOutcome::Failed(_) => metrics.job_failed(),
            EngineOutcome::AlreadyTerminal(_) => metrics.job_skipped(),
        }

        let job = outcome.into_job();
        info!(job_id = %job_id, status = %job.status, "Synchronous exchange finished");
        Ok(ExchangeResult::from(&job))
    }
}
