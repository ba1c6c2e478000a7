//! Ledger entry types for double-entry bookkeeping.

use chrono::{DateTime, Utc};
use fxledger_common::{AccountId, Currency, JobId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Value leaving an account.
    Debit,
    /// Value arriving in an account.
    Credit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "debit",
            EntryType::Credit => "credit",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(EntryType::Debit),
            "credit" => Ok(EntryType::Credit),
            other => Err(format!("unknown entry type {:?}", other)),
        }
    }
}

/// A single immutable ledger entry, keyed by (job, account, entry type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Job this entry belongs to.
    pub job_id: JobId,
    /// Account affected.
    pub account_id: AccountId,
    /// Entry type (debit or credit).
    pub entry_type: EntryType,
    /// Amount, always positive.
    pub amount: Decimal,
    /// Currency, recorded redundantly for audit.
    pub currency: Currency,
    /// When this entry was written.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a debit entry.
    pub fn debit(job_id: JobId, account_id: AccountId, amount: Decimal, currency: Currency) -> Self {
        Self {
            job_id,
            account_id,
            entry_type: EntryType::Debit,
            amount,
            currency,
            created_at: Utc::now(),
        }
    }

    /// Create a credit entry.
    pub fn credit(job_id: JobId, account_id: AccountId, amount: Decimal, currency: Currency) -> Self {
        Self {
            job_id,
            account_id,
            entry_type: EntryType::Credit,
            amount,
            currency,
            created_at: Utc::now(),
        }
    }

    /// Balance delta this entry applies to its account.
    pub fn balance_delta(&self) -> Decimal {
        match self.entry_type {
            EntryType::Debit => -self.amount,
            EntryType::Credit => self.amount,
        }
    }

    /// Composite identity of the entry.
    pub fn key(&self) -> (JobId, AccountId, EntryType) {
        (self.job_id, self.account_id, self.entry_type)
    }
}

/// Check the per-job double-entry shape: exactly one debit and one credit.
pub fn is_matched_pair(entries: &[LedgerEntry]) -> bool {
    let debits = entries
        .iter()
        .filter(|e| e.entry_type == EntryType::Debit)
        .count();
    let credits = entries
        .iter()
        .filter(|e| e.entry_type == EntryType::Credit)
        .count();

    debits == 1 && credits == 1 && entries.iter().all(|e| e.job_id == entries[0].job_id)
}
