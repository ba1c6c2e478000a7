//! fxledger Ledger Store
//!
//! Durable state for conversions: accounts, conversion jobs, double-entry
//! ledger entries and outbox records. Every mutation happens inside a
//! [`LedgerTx`] that holds explicit row locks until commit or rollback.

pub mod account;
pub mod journal;
pub mod outbox;
pub mod store;
pub mod postgres;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use account::Account;
pub use journal::{EntryType, LedgerEntry};
pub use outbox::{ConversionEvent, OutboxRecord};
pub use store::{LedgerStore, LedgerTx, StoreError, StoreResult};
pub use postgres::{PgLedgerStore, PgLedgerTx};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{FailPoint, MemoryLedgerStore, MemoryLedgerTx};
