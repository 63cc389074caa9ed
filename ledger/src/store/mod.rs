//! Ledger storage.
//!
//! A [`LedgerStore`] hands out [`LedgerTx`] units of work. Every
//! balance-mutating operation runs inside exactly one `LedgerTx` and re-reads
//! the account row through it (`lock_account`) before computing a new balance.
//! Dropping a transaction without `commit` discards all of its writes.

use async_trait::async_trait;
use ofistur_common::{
    AccountId, AgencyId, Currency, EntryId, Page, PageRequest, Result, Subject,
};
use rust_decimal::Decimal;
use tracing::warn;

use crate::account::{AccountFilter, CreditAccount};
use crate::entry::{CreditEntry, EntryFilter};

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Per-agency sequence counters backing human-readable numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgencyCounter {
    CreditAccount,
    CreditEntry,
}

impl AgencyCounter {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgencyCounter::CreditAccount => "credit_account",
            AgencyCounter::CreditEntry => "credit_entry",
        }
    }
}

/// Durable storage for accounts and entries.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Start a transaction.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>>;

    /// Agency owning a client or operator, `None` if the subject is unknown.
    async fn subject_agency(&self, subject: &Subject) -> Result<Option<AgencyId>>;

    async fn find_account(&self, id: AccountId) -> Result<Option<CreditAccount>>;

    async fn find_entry(&self, id: EntryId) -> Result<Option<CreditEntry>>;

    /// Accounts of an agency, most recently updated first.
    async fn list_accounts(
        &self,
        agency_id: AgencyId,
        filter: &AccountFilter,
        page: &PageRequest,
    ) -> Result<Page<CreditAccount>>;

    /// Entries of an agency, newest first.
    async fn list_entries(
        &self,
        agency_id: AgencyId,
        filter: &EntryFilter,
        page: &PageRequest,
    ) -> Result<Page<CreditEntry>>;
}

/// One storage transaction.
#[async_trait]
pub trait LedgerTx: Send {
    /// Read an account and hold its row lock until the transaction ends.
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<CreditAccount>>;

    /// Serialize find-or-create for one (agency, subject, currency) key.
    async fn lock_subject_key(
        &mut self,
        agency_id: AgencyId,
        subject: &Subject,
        currency: &Currency,
    ) -> Result<()>;

    /// Locked read of the account for (agency, subject, currency).
    async fn find_account_by_key(
        &mut self,
        agency_id: AgencyId,
        subject: &Subject,
        currency: &Currency,
    ) -> Result<Option<CreditAccount>>;

    /// Insert a new account. Returns `false` if the key already exists.
    async fn insert_account(&mut self, account: &CreditAccount) -> Result<bool>;

    async fn set_balance(&mut self, id: AccountId, balance: Decimal) -> Result<()>;

    async fn set_enabled(&mut self, id: AccountId, enabled: bool) -> Result<()>;

    /// Next value of an agency counter, starting at 1.
    async fn next_agency_counter(&mut self, agency_id: AgencyId, counter: AgencyCounter)
        -> Result<i64>;

    /// Read an entry and hold its row lock until the transaction ends.
    async fn lock_entry(&mut self, id: EntryId) -> Result<Option<CreditEntry>>;

    async fn insert_entry(&mut self, entry: &CreditEntry) -> Result<()>;

    /// Persist the mutable fields (concept, value date, doc type, reference).
    async fn update_entry(&mut self, entry: &CreditEntry) -> Result<()>;

    async fn delete_entry(&mut self, id: EntryId) -> Result<()>;

    /// All entries of an account.
    async fn account_entries(&mut self, id: AccountId) -> Result<Vec<CreditEntry>>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Commit `tx` if `result` is `Ok`, otherwise roll it back and return the error.
pub async fn finish<T>(tx: Box<dyn LedgerTx>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
