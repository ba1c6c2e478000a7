//! In-memory ledger store for tests.
//!
//! A single writer at a time: [`MemoryLedgerStore::begin`] takes the store
//! mutex and works on a private copy of the state that is published only on
//! commit. Dropping the transaction discards the copy. The same lock-before-
//! mutate and non-negative balance rules as the PostgreSQL store apply.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fxledger_common::{AccountId, ConversionJob, Currency, JobId, JobTransition, UserId};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::account::Account;
use crate::journal::LedgerEntry;
use crate::outbox::OutboxRecord;
use crate::store::{LedgerStore, LedgerTx, StoreError, StoreResult};

/// Transaction steps that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertJob,
    InsertLedgerEntry,
    TransitionJob,
    InsertOutboxRecord,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: BTreeMap<AccountId, Account>,
    jobs: HashMap<JobId, ConversionJob>,
    entries: Vec<LedgerEntry>,
    outbox: Vec<OutboxRecord>,
}

impl LedgerState {
    fn account_for(&self, user_id: &UserId, currency: &Currency) -> Option<AccountId> {
        self.accounts
            .values()
            .find(|a| &a.user_id == user_id && &a.currency == currency)
            .map(|a| a.id)
    }
}

/// Shared in-memory ledger.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<AsyncMutex<LedgerState>>,
    fail_points: Arc<Mutex<HashSet<FailPoint>>>,
    lock_log: Arc<Mutex<Vec<AccountId>>>,
    created_log: Arc<Mutex<Vec<Currency>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite the (user, currency) account balance.
    pub async fn set_balance(&self, user_id: &str, currency: &str, balance: Decimal) -> AccountId {
        let user_id = UserId::new(user_id);
        let currency = Currency::new(currency);
        let mut state = self.state.lock().await;

        let id = match state.account_for(&user_id, &currency) {
            Some(id) => id,
            None => {
                let account = Account::open(user_id, currency);
                let id = account.id;
                state.accounts.insert(id, account);
                id
            }
        };

        if let Some(account) = state.accounts.get_mut(&id) {
            account.balance = balance;
            account.updated_at = Utc::now();
        }

        id
    }

    /// Committed balance of the (user, currency) account, if it exists.
    pub async fn balance_of(&self, user_id: &str, currency: &str) -> Option<Decimal> {
        let state = self.state.lock().await;
        state
            .account_for(&UserId::new(user_id), &Currency::new(currency))
            .and_then(|id| state.accounts.get(&id))
            .map(|a| a.balance)
    }

    /// Make the next transaction reaching `point` fail.
    pub fn fail_at(&self, point: FailPoint) {
        self.fail_points.lock().insert(point);
    }

    /// Account ids in the order transactions locked them.
    pub fn lock_log(&self) -> Vec<AccountId> {
        self.lock_log.lock().clone()
    }

    /// Currencies of accounts created by transactions, in creation order.
    pub fn created_log(&self) -> Vec<Currency> {
        self.created_log.lock().clone()
    }

    pub async fn job_count(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    pub async fn all_entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.entries.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Tx = MemoryLedgerTx;

    async fn begin(&self) -> StoreResult<MemoryLedgerTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();

        Ok(MemoryLedgerTx {
            guard,
            working,
            locked_jobs: HashSet::new(),
            locked_accounts: HashSet::new(),
            fail_points: self.fail_points.clone(),
            lock_log: self.lock_log.clone(),
            created_log: self.created_log.clone(),
        })
    }

    async fn get_job(&self, job_id: JobId) -> StoreResult<Option<ConversionJob>> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn find_job_by_idempotency_key(&self, key: &str) -> StoreResult<Option<ConversionJob>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .find(|j| j.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn balances(&self, user_id: &UserId) -> StoreResult<Vec<Account>> {
        let state = self.state.lock().await;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| &a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.currency.cmp(&b.currency));
        Ok(accounts)
    }

    async fn ledger_entries(&self, job_id: JobId) -> StoreResult<Vec<LedgerEntry>> {
        let state = self.state.lock().await;
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.entry_type);
        Ok(entries)
    }

    async fn outbox_records(&self, aggregate_id: JobId) -> StoreResult<Vec<OutboxRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .outbox
            .iter()
            .filter(|r| r.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }
}

/// Transaction over [`MemoryLedgerStore`].
pub struct MemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
    locked_jobs: HashSet<JobId>,
    locked_accounts: HashSet<AccountId>,
    fail_points: Arc<Mutex<HashSet<FailPoint>>>,
    lock_log: Arc<Mutex<Vec<AccountId>>>,
    created_log: Arc<Mutex<Vec<Currency>>>,
}

impl MemoryLedgerTx {
    fn check(&self, point: FailPoint) -> StoreResult<()> {
        if self.fail_points.lock().remove(&point) {
            return Err(StoreError::Injected(format!("{:?}", point)));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn lock_job_for_update(&mut self, job_id: JobId) -> StoreResult<Option<ConversionJob>> {
        let job = self.working.jobs.get(&job_id).cloned();
        if job.is_some() {
            self.locked_jobs.insert(job_id);
        }
        Ok(job)
    }

    async fn insert_job(&mut self, job: &ConversionJob) -> StoreResult<()> {
        self.check(FailPoint::InsertJob)?;

        if let Some(key) = job.idempotency_key.as_deref() {
            let taken = self
                .working
                .jobs
                .values()
                .any(|j| j.idempotency_key.as_deref() == Some(key));
            if taken {
                return Err(StoreError::Conflict(format!(
                    "idempotency key {:?} already used",
                    key
                )));
            }
        }
        if self.working.jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("job {} exists", job.id)));
        }

        self.working.jobs.insert(job.id, job.clone());
        self.locked_jobs.insert(job.id);
        Ok(())
    }

    async fn ensure_account(
        &mut self,
        user_id: &UserId,
        currency: &Currency,
    ) -> StoreResult<AccountId> {
        if let Some(id) = self.working.account_for(user_id, currency) {
            return Ok(id);
        }

        let account = Account::open(user_id.clone(), currency.clone());
        let id = account.id;
        self.working.accounts.insert(id, account);
        self.created_log.lock().push(currency.clone());
        Ok(id)
    }

    async fn lock_account_balance(&mut self, account_id: AccountId) -> StoreResult<Decimal> {
        let balance = self
            .working
            .accounts
            .get(&account_id)
            .map(|a| a.balance)
            .ok_or(StoreError::AccountNotFound(account_id))?;

        if self.locked_accounts.insert(account_id) {
            self.lock_log.lock().push(account_id);
        }
        Ok(balance)
    }

    async fn adjust_balance(&mut self, account_id: AccountId, delta: Decimal) -> StoreResult<Decimal> {
        if !self.locked_accounts.contains(&account_id) {
            return Err(StoreError::NotLocked(format!("account {}", account_id)));
        }

        let account = self
            .working
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::AccountNotFound(account_id))?;
        let next = account
            .balance_after(delta)
            .ok_or(StoreError::NegativeBalance(account_id))?;

        account.balance = next;
        account.updated_at = Utc::now();
        Ok(next)
    }

    async fn insert_ledger_entry(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        self.check(FailPoint::InsertLedgerEntry)?;

        if self.working.entries.iter().any(|e| e.key() == entry.key()) {
            return Err(StoreError::Conflict(format!(
                "{} entry for job {} already written",
                entry.entry_type, entry.job_id
            )));
        }

        self.working.entries.push(entry.clone());
        Ok(())
    }

    async fn transition_job(&mut self, job_id: JobId, transition: &JobTransition) -> StoreResult<()> {
        self.check(FailPoint::TransitionJob)?;

        if !self.locked_jobs.contains(&job_id) {
            return Err(StoreError::NotLocked(format!("job {}", job_id)));
        }

        let job = self
            .working
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;
        job.apply(transition)
            .map_err(|_| StoreError::Conflict(format!("job {} is not queued", job_id)))
    }

    async fn insert_outbox_record(&mut self, record: &OutboxRecord) -> StoreResult<()> {
        self.check(FailPoint::InsertOutboxRecord)?;
        self.working.outbox.push(record.clone());
        Ok(())
    }

    async fn commit(mut self) -> StoreResult<()> {
        self.check(FailPoint::Commit)?;
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxledger_common::ConversionRequest;
    use rust_decimal_macros::dec;

    fn queued_job() -> ConversionJob {
        let order = ConversionRequest::new("alice", "USD", "EUR", dec!(10))
            .validate()
            .unwrap();
        ConversionJob::queued(order)
    }

    #[tokio::test]
    async fn test_uncommitted_changes_are_discarded() {
        let store = MemoryLedgerStore::new();
        let job = queued_job();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_job(&job).await.unwrap();
        }

        assert!(store.get_job(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let store = MemoryLedgerStore::new();
        let job = queued_job();

        let mut tx = store.begin().await.unwrap();
        tx.insert_job(&job).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_job(job.id).await.unwrap(), Some(job));
    }

    #[tokio::test]
    async fn test_adjust_requires_lock_and_non_negative_balance() {
        let store = MemoryLedgerStore::new();
        let id = store.set_balance("alice", "USD", dec!(5)).await;

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.adjust_balance(id, dec!(-1)).await,
            Err(StoreError::NotLocked(_))
        ));

        assert_eq!(tx.lock_account_balance(id).await.unwrap(), dec!(5));
        assert!(matches!(
            tx.adjust_balance(id, dec!(-6)).await,
            Err(StoreError::NegativeBalance(_))
        ));
        assert_eq!(tx.adjust_balance(id, dec!(-5)).await.unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn test_ensure_account_is_idempotent() {
        let store = MemoryLedgerStore::new();
        let user = UserId::new("alice");

        let mut tx = store.begin().await.unwrap();
        let first = tx.ensure_account(&user, &Currency::usd()).await.unwrap();
        let second = tx.ensure_account(&user, &Currency::usd()).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.balances(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_conflicts() {
        let store = MemoryLedgerStore::new();
        let order = ConversionRequest::new("alice", "USD", "EUR", dec!(10))
            .with_idempotency_key("k-1")
            .validate()
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_job(&ConversionJob::queued(order.clone())).await.unwrap();
        let again = tx.insert_job(&ConversionJob::queued(order)).await;

        assert!(matches!(again, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_fail_point_fires_once() {
        let store = MemoryLedgerStore::new();
        store.fail_at(FailPoint::InsertJob);

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.insert_job(&queued_job()).await,
            Err(StoreError::Injected(_))
        ));
        tokio_test::assert_ok!(tx.insert_job(&queued_job()).await);
    }
}
