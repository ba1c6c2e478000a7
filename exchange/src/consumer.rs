//! Job consumer.
//!
//! Consumes batches of dispatched job references under at-least-once
//! delivery. Each message is handled independently: an undecodable message or
//! a failing job is logged and the rest of the batch carries on.

use std::sync::Arc;

use fxledger_common::{ExchangeError, JobId, JobMessage, Result};
use fxledger_ledger::{LedgerStore, LedgerTx};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::context::ExchangeContext;
use crate::engine::EngineOutcome;

/// A job whose processing was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobError {
    pub job_id: JobId,
    pub code: &'static str,
    pub retryable: bool,
    pub message: String,
}

/// What happened to one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub undecodable: usize,
    pub errored: usize,
    pub errors: Vec<JobError>,
}

impl BatchReport {
    /// Messages seen.
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.skipped + self.undecodable + self.errored
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: BatchReport) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.undecodable += other.undecodable;
        self.errored += other.errored;
        self.errors.extend(other.errors);
    }
}

/// Drives dispatched jobs through the conversion engine.
pub struct JobConsumer<S: LedgerStore> {
    ctx: Arc<ExchangeContext<S>>,
}

impl<S: LedgerStore> JobConsumer<S> {
    /// Create a new consumer.
    pub fn new(ctx: Arc<ExchangeContext<S>>) -> Self {
        Self { ctx }
    }

    /// Process a batch of raw job messages.
    #[instrument(skip(self, messages), fields(batch_size = messages.len()))]
    pub async fn consume_batch<M: AsRef<str>>(&self, messages: &[M]) -> BatchReport {
        let mut report = BatchReport::default();

        for raw in messages {
            let message: JobMessage = match serde_json::from_str(raw.as_ref()) {
                Ok(message) => message,
                Err(e) => {
                    self.ctx.metrics().message_undecodable();
                    warn!(error = %e, "Skipping undecodable job message");
                    report.undecodable += 1;
                    continue;
                }
            };

            match self.process(message.job_id).await {
                Ok(EngineOutcome::Completed(_)) => report.completed += 1,
                Ok(EngineOutcome::Failed(_)) => report.failed += 1,
                Ok(EngineOutcome::AlreadyTerminal(_)) => report.skipped += 1,
                Err(e) => {
                    error!(
                        job_id = %message.job_id,
                        error = %e,
                        code = e.error_code(),
                        retryable = e.is_retryable(),
                        "Job processing failed"
                    );
                    report.errored += 1;
                    report.errors.push(JobError {
                        job_id: message.job_id,
                        code: e.error_code(),
                        retryable: e.is_retryable(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            undecodable = report.undecodable,
            errored = report.errored,
            "Batch consumed"
        );
        report
    }

    /// Run one job in its own transaction under the operation deadline.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn process(&self, job_id: JobId) -> Result<EngineOutcome> {
        let outcome = self
            .ctx
            .with_deadline("process job", async {
                let mut tx = self.ctx.store().begin().await?;
                let outcome = self.ctx.engine().process(&mut tx, job_id).await?;

                match outcome {
                    EngineOutcome::AlreadyTerminal(_) => drop(tx),
                    _ => tx.commit().await?,
                }
                Ok::<_, ExchangeError>(outcome)
            })
            .await;

        let metrics = self.ctx.metrics();
        match &outcome {
            Ok(EngineOutcome::Completed(_)) => metrics.job_completed(),
            Ok(EngineOutcome::Failed(_)) => metrics.job_failed(),
            Ok(EngineOutcome::AlreadyTerminal(_)) => metrics.job_skipped(),
            Err(_) => metrics.job_errored(),
        }

        outcome
    }

    /// Drain `receiver` in batches of up to `batch_size` until every sender
    /// is gone.
    pub async fn run(&self, mut receiver: mpsc::Receiver<String>, batch_size: usize) -> BatchReport {
        let mut total = BatchReport::default();
        let batch_size = batch_size.max(1);

        info!(batch_size, "Consumer started");
        while let Some(first) = receiver.recv().await {
            let mut batch = vec![first];
            while batch.len() < batch_size {
                match receiver.try_recv() {
                    Ok(message) => batch.push(message),
                    Err(_) => break,
                }
            }

            debug!(messages = batch.len(), "Consuming batch");
            total.merge(self.consume_batch(&batch).await);
        }

        info!(processed = total.total(), "Consumer stopped, channel closed");
        total
    }
}
