//! Conversion engine.
//!
//! Drives one queued job to a terminal state inside a caller-owned
//! transaction: reserve, rate, settle, record. The caller commits on `Ok` and
//! drops the transaction on `Err`, so nothing is persisted unless every step
//! succeeded.

use std::sync::Arc;

use chrono::Utc;
use fxledger_common::{
    AccountId, ConversionJob, CurrencyPair, ExchangeError, FailureReason, JobId, JobStatus,
    JobTransition, Result,
};
use fxledger_fx::{Conversion, RateOracle};
use fxledger_ledger::{ConversionEvent, LedgerEntry, LedgerTx};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

/// Result of driving a job through the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutcome {
    /// Funds moved, entries written, job completed.
    Completed(ConversionJob),
    /// Business failure recorded on the job.
    Failed(ConversionJob),
    /// Job was already terminal; nothing touched.
    AlreadyTerminal(ConversionJob),
}

impl EngineOutcome {
    pub fn job(&self) -> &ConversionJob {
        match self {
            EngineOutcome::Completed(job)
            | EngineOutcome::Failed(job)
            | EngineOutcome::AlreadyTerminal(job) => job,
        }
    }

    pub fn into_job(self) -> ConversionJob {
        match self {
            EngineOutcome::Completed(job)
            | EngineOutcome::Failed(job)
            | EngineOutcome::AlreadyTerminal(job) => job,
        }
    }
}

/// The two accounts of a conversion, locked.
struct LockedAccounts {
    source: AccountId,
    target: AccountId,
    source_balance: Decimal,
}

/// Settles conversion jobs against the ledger.
#[derive(Clone)]
pub struct ConversionEngine {
    oracle: Arc<dyn RateOracle>,
}

impl ConversionEngine {
    /// Create a new engine.
    pub fn new(oracle: Arc<dyn RateOracle>) -> Self {
        Self { oracle }
    }

    /// Lock the job and settle it if it is still queued.
    #[instrument(skip(self, tx), fields(job_id = %job_id))]
    pub async fn process<T: LedgerTx>(&self, tx: &mut T, job_id: JobId) -> Result<EngineOutcome> {
        let job = tx
            .lock_job_for_update(job_id)
            .await?
            .ok_or(ExchangeError::JobNotFound(job_id))?;

        if job.status.is_terminal() {
            debug!(status = %job.status, "Job already terminal, skipping");
            return Ok(EngineOutcome::AlreadyTerminal(job));
        }

        self.settle(tx, job).await
    }

    /// Settle a queued job whose row the transaction already holds.
    #[instrument(skip(self, tx, job), fields(job_id = %job.id))]
    pub async fn settle<T: LedgerTx>(&self, tx: &mut T, mut job: ConversionJob) -> Result<EngineOutcome> {
        if job.status != JobStatus::Queued {
            return Ok(EngineOutcome::AlreadyTerminal(job));
        }

        let accounts = self.lock_accounts(tx, &job).await?;

        if accounts.source_balance < job.source_amount {
            let transition = JobTransition::Failed {
                reason: FailureReason::InsufficientFunds,
                failed_at: Utc::now(),
            };
            tx.transition_job(job.id, &transition).await?;
            job.apply(&transition)?;
            self.record_event(tx, &job).await?;

            info!(
                job_id = %job.id,
                balance = %accounts.source_balance,
                requested = %job.source_amount,
                "Insufficient funds, job failed"
            );
            return Ok(EngineOutcome::Failed(job));
        }

        let pair = CurrencyPair::new(job.source_currency.clone(), job.target_currency.clone());
        let quote = self.oracle.lookup_rate(&pair).await?;
        let conversion = Conversion::compute(job.source_amount, &quote)?;

        tx.adjust_balance(accounts.source, -job.source_amount).await?;
        tx.adjust_balance(accounts.target, conversion.target_amount).await?;

        tx.insert_ledger_entry(&LedgerEntry::debit(
            job.id,
            accounts.source,
            job.source_amount,
            job.source_currency.clone(),
        ))
        .await?;
        tx.insert_ledger_entry(&LedgerEntry::credit(
            job.id,
            accounts.target,
            conversion.target_amount,
            job.target_currency.clone(),
        ))
        .await?;

        let transition = JobTransition::Completed {
            target_amount: conversion.target_amount,
            rate: conversion.rate,
            fee: conversion.fee,
            completed_at: Utc::now(),
        };
        tx.transition_job(job.id, &transition).await?;
        job.apply(&transition)?;
        self.record_event(tx, &job).await?;

        info!(
            job_id = %job.id,
            pair = %pair,
            rate = %conversion.rate,
            effective_rate = %conversion.effective_rate(),
            fee = %conversion.fee,
            target_amount = %conversion.target_amount,
            "Conversion completed"
        );
        Ok(EngineOutcome::Completed(job))
    }

    /// Ensure both accounts exist, in currency-code order, then lock them in
    /// ascending id order.
    async fn lock_accounts<T: LedgerTx>(&self, tx: &mut T, job: &ConversionJob) -> Result<LockedAccounts> {
        let (source, target) = if job.source_currency <= job.target_currency {
            let source = tx.ensure_account(&job.user_id, &job.source_currency).await?;
            let target = tx.ensure_account(&job.user_id, &job.target_currency).await?;
            (source, target)
        } else {
            let target = tx.ensure_account(&job.user_id, &job.target_currency).await?;
            let source = tx.ensure_account(&job.user_id, &job.source_currency).await?;
            (source, target)
        };

        let (first, second) = if source <= target {
            (source, target)
        } else {
            (target, source)
        };
        let first_balance = tx.lock_account_balance(first).await?;
        let second_balance = tx.lock_account_balance(second).await?;

        let source_balance = if first == source {
            first_balance
        } else {
            second_balance
        };

        Ok(LockedAccounts {
            source,
            target,
            source_balance,
        })
    }

    async fn record_event<T: LedgerTx>(&self, tx: &mut T, job: &ConversionJob) -> Result<()> {
        let event = ConversionEvent::from_terminal_job(job).ok_or_else(|| {
            ExchangeError::Store(format!("job {} has no terminal event", job.id))
        })?;
        let record = event
            .to_record()
            .map_err(|e| ExchangeError::Store(format!("encode event: {}", e)))?;

        tx.insert_outbox_record(&record).await?;
        Ok(())
    }
}
