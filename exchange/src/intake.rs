//! Job intake.

use std::sync::Arc;

use fxledger_common::{
    ConversionJob, ConversionOrder, ConversionRequest, ExchangeError, JobMessage, JobReceipt,
    Result,
};
use fxledger_ledger::outbox::JOBS_TOPIC;
use fxledger_ledger::{LedgerStore, LedgerTx, OutboxRecord, StoreError};
use tracing::{info, instrument, warn};

use crate::context::ExchangeContext;

/// Accepts conversion requests and queues them as jobs.
pub struct JobIntake<S: LedgerStore> {
    ctx: Arc<ExchangeContext<S>>,
}

impl<S: LedgerStore> JobIntake<S> {
    /// Create a new intake.
    pub fn new(ctx: Arc<ExchangeContext<S>>) -> Self {
        Self { ctx }
    }

    /// Validate, deduplicate by idempotency key, persist a queued job with
    /// its outbox record, then notify the dispatch path.
    ///
    /// A submit whose key already exists returns the existing job unchanged.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn submit(&self, request: &ConversionRequest) -> Result<JobReceipt> {
        let order = request.validate()?;

        let (job, created) = self
            .ctx
            .with_deadline("submit", self.persist(order))
            .await?;

        if !created {
            self.ctx.metrics().job_deduplicated();
            info!(job_id = %job.id, "Idempotency key matched existing job");
            return Ok(JobReceipt::from(&job));
        }

        self.ctx.metrics().job_submitted();
        info!(job_id = %job.id, "Job queued");

        let message = JobMessage::from(&job);
        if let Err(e) = self.ctx.dispatcher().dispatch(&message).await {
            self.ctx.metrics().dispatch_failed();
            warn!(job_id = %job.id, error = %e, "Dispatch notification failed, outbox remains");
        }

        Ok(JobReceipt::from(&job))
    }

    /// Returns the job and whether this call created it.
    async fn persist(&self, order: ConversionOrder) -> Result<(ConversionJob, bool)> {
        if let Some(key) = order.idempotency_key.as_deref() {
            if let Some(existing) = self.ctx.store().find_job_by_idempotency_key(key).await? {
                return Ok((existing, false));
            }
        }

        let job = ConversionJob::queued(order);
        let record = OutboxRecord::for_job(job.id, JOBS_TOPIC, &JobMessage::from(&job))
            .map_err(|e| ExchangeError::Store(format!("encode job message: {}", e)))?;

        let mut tx = self.ctx.store().begin().await?;
        match tx.insert_job(&job).await {
            Ok(()) => {}
            Err(StoreError::Conflict(reason)) => {
                drop(tx);
                return self.winner_of_race(&job, reason).await;
            }
            Err(e) => return Err(e.into()),
        }
        tx.insert_outbox_record(&record).await?;
        tx.commit().await?;

        Ok((job, true))
    }

    /// A concurrent submit with the same key committed first.
    async fn winner_of_race(&self, job: &ConversionJob, reason: String) -> Result<(ConversionJob, bool)> {
        let Some(key) = job.idempotency_key.as_deref() else {
            return Err(ExchangeError::Conflict(reason));
        };

        match self.ctx.store().find_job_by_idempotency_key(key).await? {
            Some(existing) => Ok((existing, false)),
            None => Err(ExchangeError::Conflict(reason)),
        }
    }
}
