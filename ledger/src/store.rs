//! Ledger store contract consumed by the conversion engine.

use async_trait::async_trait;
use fxledger_common::{
    AccountId, ConversionJob, Currency, ExchangeError, JobId, JobTransition, UserId,
};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::account::Account;
use crate::journal::LedgerEntry;
use crate::outbox::OutboxRecord;

/// Errors raised by a ledger store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database driver error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Unique constraint violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Account row absent.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Job row absent.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Mutation attempted on a row this transaction has not locked.
    #[error("Row not locked by this transaction: {0}")]
    NotLocked(String),

    /// Balance update would make the balance negative.
    #[error("Balance would become negative for account {0}")]
    NegativeBalance(AccountId),

    /// Stored row cannot be mapped back to a domain value.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Failure injected by a test store.
    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for ExchangeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => ExchangeError::Conflict(message),
            StoreError::AccountNotFound(id) => ExchangeError::AccountNotFound(id.to_string()),
            StoreError::JobNotFound(id) => ExchangeError::JobNotFound(id),
            other => ExchangeError::Store(other.to_string()),
        }
    }
}

/// One open, atomic unit of work against the ledger.
///
/// Dropping a transaction without calling [`LedgerTx::commit`] rolls back
/// every change made through it and releases its locks.
#[async_trait]
pub trait LedgerTx: Send {
    /// Read a job and hold its row lock until the transaction ends.
    async fn lock_job_for_update(&mut self, job_id: JobId) -> StoreResult<Option<ConversionJob>>;

    /// Insert a new job. A taken idempotency key is a [`StoreError::Conflict`].
    async fn insert_job(&mut self, job: &ConversionJob) -> StoreResult<()>;

    /// Return the (user, currency) account, creating it with a zero balance
    /// if missing. Safe under concurrent first use.
    async fn ensure_account(&mut self, user_id: &UserId, currency: &Currency)
        -> StoreResult<AccountId>;

    /// Lock an account row and return its balance.
    async fn lock_account_balance(&mut self, account_id: AccountId) -> StoreResult<Decimal>;

    /// Add `delta` to a locked account and return the new balance.
    async fn adjust_balance(&mut self, account_id: AccountId, delta: Decimal)
        -> StoreResult<Decimal>;

    async fn insert_ledger_entry(&mut self, entry: &LedgerEntry) -> StoreResult<()>;

    /// Move a locked, queued job to its terminal state.
    async fn transition_job(&mut self, job_id: JobId, transition: &JobTransition)
        -> StoreResult<()>;

    async fn insert_outbox_record(&mut self, record: &OutboxRecord) -> StoreResult<()>;

    /// Make every change visible atomically.
    async fn commit(self) -> StoreResult<()>;
}

/// A ledger store: opens transactions and serves committed-only reads.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    type Tx: LedgerTx + 'static;

    /// Open a transaction.
    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn get_job(&self, job_id: JobId) -> StoreResult<Option<ConversionJob>>;

    async fn find_job_by_idempotency_key(&self, key: &str) -> StoreResult<Option<ConversionJob>>;

    /// All accounts of a user, ordered by currency.
    async fn balances(&self, user_id: &UserId) -> StoreResult<Vec<Account>>;

    async fn ledger_entries(&self, job_id: JobId) -> StoreResult<Vec<LedgerEntry>>;

    async fn outbox_records(&self, aggregate_id: JobId) -> StoreResult<Vec<OutboxRecord>>;
}
