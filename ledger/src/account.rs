//! Balance accounts.

use chrono::{DateTime, Utc};
use fxledger_common::{AccountId, Currency, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A per-user, per-currency balance account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier.
    pub id: AccountId,
    /// Owning user.
    pub user_id: UserId,
    /// Account currency.
    pub currency: Currency,
    /// Current balance, never negative.
    pub balance: Decimal,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the balance last changed.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Open an empty account.
    pub fn open(user_id: UserId, currency: Currency) -> Self {
        let now = Utc::now();

        Self {
            id: AccountId::new(),
            user_id,
            currency,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if account has sufficient funds for a debit.
    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Balance after applying `delta`, or `None` if it would go negative.
    pub fn balance_after(&self, delta: Decimal) -> Option<Decimal> {
        let next = self.balance + delta;
        (next >= Decimal::ZERO).then_some(next)
    }
}
