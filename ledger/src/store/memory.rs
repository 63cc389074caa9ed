//! In-memory ledger store.
//!
//! Transactions are serialized through one async mutex and work on a private
//! copy of the state that replaces the shared state only on commit. Used by
//! tests and the `memory` storage backend.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use ofistur_common::{
    AccountId, AgencyId, ClientId, Currency, EntryId, LedgerError, OperatorId, Page, PageRequest,
    Result, Subject,
};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::{AgencyCounter, LedgerStore, LedgerTx};
use crate::account::{AccountFilter, CreditAccount};
use crate::entry::{CreditEntry, EntryFilter};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: HashMap<AccountId, CreditAccount>,
    entries: HashMap<EntryId, CreditEntry>,
    counters: HashMap<(AgencyId, AgencyCounter), i64>,
}

/// Ledger store kept in process memory.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
    subjects: DashMap<Subject, AgencyId>,
    fail_next_commit: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client or operator as belonging to an agency.
    pub fn register_subject(&self, agency_id: AgencyId, subject: Subject) {
        self.subjects.insert(subject, agency_id);
    }

    pub fn register_client(&self, agency_id: AgencyId, client_id: ClientId) {
        self.register_subject(agency_id, Subject::Client(client_id));
    }

    pub fn register_operator(&self, agency_id: AgencyId, operator_id: OperatorId) {
        self.register_subject(agency_id, Subject::Operator(operator_id));
    }

    /// Make the commit of the next transaction fail, discarding its writes.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of stored entries across all agencies.
    pub async fn entry_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Number of stored accounts across all agencies.
    pub async fn account_count(&self) -> usize {
        self.state.lock().await.accounts.len()
    }
}

fn paginate<T>(rows: Vec<T>, page: &PageRequest, id_of: impl Fn(&T) -> Uuid) -> Result<Page<T>> {
    let start = match page.cursor {
        Some(cursor) => rows
            .iter()
            .position(|row| id_of(row) == cursor)
            .map(|index| index + 1)
            .ok_or_else(|| LedgerError::validation("unknown cursor", "cursor"))?,
        None => 0,
    };
    let take = page.take();
    let window: Vec<T> = rows.into_iter().skip(start).take(take + 1).collect();
    Ok(Page::from_overfetch(window, take, id_of))
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        let fail_commit = self.fail_next_commit.swap(false, Ordering::SeqCst);
        Ok(Box::new(MemoryTx {
            guard,
            working,
            fail_commit,
        }))
    }

    async fn subject_agency(&self, subject: &Subject) -> Result<Option<AgencyId>> {
        Ok(self.subjects.get(subject).map(|agency| *agency))
    }

    async fn find_account(&self, id: AccountId) -> Result<Option<CreditAccount>> {
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn find_entry(&self, id: EntryId) -> Result<Option<CreditEntry>> {
        Ok(self.state.lock().await.entries.get(&id).cloned())
    }

    async fn list_accounts(
        &self,
        agency_id: AgencyId,
        filter: &AccountFilter,
        page: &PageRequest,
    ) -> Result<Page<CreditAccount>> {
        let state = self.state.lock().await;
        let mut rows: Vec<CreditAccount> = state
            .accounts
            .values()
            .filter(|a| a.agency_id == agency_id && filter.matches(a))
            .cloned()
            .collect();
        rows.sort_by_key(|a| Reverse((a.updated_at, a.id)));
        paginate(rows, page, |a| *a.id.as_uuid())
    }

    async fn list_entries(
        &self,
        agency_id: AgencyId,
        filter: &EntryFilter,
        page: &PageRequest,
    ) -> Result<Page<CreditEntry>> {
        let state = self.state.lock().await;
        let mut rows: Vec<CreditEntry> = state
            .entries
            .values()
            .filter(|e| {
                e.agency_id == agency_id && filter.matches(e, state.accounts.get(&e.account_id))
            })
            .cloned()
            .collect();
        rows.sort_by_key(|e| Reverse((e.created_at, e.id)));
        paginate(rows, page, |e| *e.id.as_uuid())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: bool,
}

impl MemoryTx {
    fn account_mut(&mut self, id: AccountId) -> Result<&mut CreditAccount> {
        self.working
            .accounts
            .get_mut(&id)
            .ok_or(LedgerError::AccountNotFound(id))
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<CreditAccount>> {
        Ok(self.working.accounts.get(&id).cloned())
    }

    async fn lock_subject_key(
        &mut self,
        _agency_id: AgencyId,
        _subject: &Subject,
        _currency: &Currency,
    ) -> Result<()> {
        // The transaction already holds the store-wide lock.
        Ok(())
    }

    async fn find_account_by_key(
        &mut self,
        agency_id: AgencyId,
        subject: &Subject,
        currency: &Currency,
    ) -> Result<Option<CreditAccount>> {
        Ok(self
            .working
            .accounts
            .values()
            .find(|a| a.matches_key(agency_id, subject, currency))
            .cloned())
    }

    async fn insert_account(&mut self, account: &CreditAccount) -> Result<bool> {
        let duplicate = self
            .working
            .accounts
            .values()
            .any(|a| a.matches_key(account.agency_id, &account.subject, &account.currency));
        if duplicate {
            return Ok(false);
        }
        self.working.accounts.insert(account.id, account.clone());
        Ok(true)
    }

    async fn set_balance(&mut self, id: AccountId, balance: Decimal) -> Result<()> {
        let account = self.account_mut(id)?;
        account.balance = balance;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn set_enabled(&mut self, id: AccountId, enabled: bool) -> Result<()> {
        let account = self.account_mut(id)?;
        account.enabled = enabled;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn next_agency_counter(
        &mut self,
        agency_id: AgencyId,
        counter: AgencyCounter,
    ) -> Result<i64> {
        let value = self.working.counters.entry((agency_id, counter)).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn lock_entry(&mut self, id: EntryId) -> Result<Option<CreditEntry>> {
        Ok(self.working.entries.get(&id).cloned())
    }

    async fn insert_entry(&mut self, entry: &CreditEntry) -> Result<()> {
        if !self.working.accounts.contains_key(&entry.account_id) {
            return Err(LedgerError::AccountNotFound(entry.account_id));
        }
        self.working.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn update_entry(&mut self, entry: &CreditEntry) -> Result<()> {
        let stored = self
            .working
            .entries
            .get_mut(&entry.id)
            .ok_or(LedgerError::EntryNotFound(entry.id))?;
        stored.concept = entry.concept.clone();
        stored.value_date = entry.value_date;
        stored.doc_type = entry.doc_type.clone();
        stored.reference = entry.reference.clone();
        stored.updated_at = entry.updated_at;
        Ok(())
    }

    async fn delete_entry(&mut self, id: EntryId) -> Result<()> {
        self.working
            .entries
            .remove(&id)
            .map(|_| ())
            .ok_or(LedgerError::EntryNotFound(id))
    }

    async fn account_entries(&mut self, id: AccountId) -> Result<Vec<CreditEntry>> {
        let mut entries: Vec<CreditEntry> = self
            .working
            .entries
            .values()
            .filter(|e| e.account_id == id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.created_at, e.id));
        Ok(entries)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx {
            mut guard,
            working,
            fail_commit,
        } = *self;
        if fail_commit {
            debug!("Discarding memory transaction on injected commit failure");
            return Err(LedgerError::Database("injected commit failure".to_string()));
        }
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account(agency: i64, client: i64) -> CreditAccount {
        CreditAccount::new(
            AgencyId(agency),
            1,
            Subject::Client(ClientId(client)),
            Currency::ars(),
        )
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryLedgerStore::new();
        let acc = account(1, 1);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_account(&acc).await.unwrap());
        drop(tx);
        assert!(store.find_account(acc.id).await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_account(&acc).await.unwrap());
        tx.set_balance(acc.id, dec!(12.50)).await.unwrap();
        tx.commit().await.unwrap();
        let stored = store.find_account(acc.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, dec!(12.50));
    }

    #[tokio::test]
    async fn test_duplicate_key_is_refused() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_account(&account(1, 1)).await.unwrap());
        assert!(!tx.insert_account(&account(1, 1)).await.unwrap());
        assert!(tx.insert_account(&account(2, 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_counters_are_per_agency() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        let a = AgencyId(1);
        let b = AgencyId(2);
        assert_eq!(tx.next_agency_counter(a, AgencyCounter::CreditEntry).await.unwrap(), 1);
        assert_eq!(tx.next_agency_counter(a, AgencyCounter::CreditEntry).await.unwrap(), 2);
        assert_eq!(tx.next_agency_counter(a, AgencyCounter::CreditAccount).await.unwrap(), 1);
        assert_eq!(tx.next_agency_counter(b, AgencyCounter::CreditEntry).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_injected_commit_failure() {
        let store = MemoryLedgerStore::new();
        store.fail_next_commit();
        let acc = account(1, 1);
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&acc).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert_eq!(store.account_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_accounts_paginates() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        for client in 1..=5 {
            tx.insert_account(&account(1, client)).await.unwrap();
        }
        tx.insert_account(&account(2, 99)).await.unwrap();
        tx.commit().await.unwrap();

        let first = store
            .list_accounts(AgencyId(1), &AccountFilter::default(), &PageRequest::first(3))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 3);
        let cursor = first.next_cursor.expect("second page");

        let second = store
            .list_accounts(
                AgencyId(1),
                &AccountFilter::default(),
                &PageRequest::new(Some(cursor), Some(3)),
            )
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.next_cursor.is_none());

        let unknown = store
            .list_accounts(
                AgencyId(1),
                &AccountFilter::default(),
                &PageRequest::new(Some(Uuid::now_v7()), None),
            )
            .await;
        assert!(unknown.is_err());
    }
}
