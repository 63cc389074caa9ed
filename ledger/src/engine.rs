//! Credit ledger engine.
//!
//! Entry point for every ledger operation. Each mutating call validates its
//! input, checks role and tenant ownership, then runs in a single storage
//! transaction that either commits all of its writes or none.

use std::sync::Arc;

use chrono::Utc;
use ofistur_common::{
    ensure_money_range, round_money, AccountId, AuthContext, Currency, EntryId, ErrorKind,
    LedgerError, Page, PageRequest, Result, Subject,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::account::{AccountFilter, CreateAccount, CreditAccount};
use crate::adjuster::{AdjustBalance, AdjustmentOutcome, BalanceAdjuster};
use crate::config::LedgerConfig;
use crate::entry::{CreditEntry, EntryFilter, EntryPatch, PostEntry};
use crate::metrics::LedgerMetrics;
use crate::mutator::{ensure_deletable, DeletedEntry, EntryMutator, UpdatedEntry};
use crate::poster::{EntryPoster, PostedEntry};
use crate::resolver::AccountResolver;
use crate::store::{finish, LedgerStore};

/// Result of `create_account`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountCreation {
    pub account: CreditAccount,
    /// False when the account already existed and was returned unchanged.
    pub created: bool,
    /// Entry recording a non-zero opening balance.
    pub opening_entry: Option<CreditEntry>,
}

/// Stored balance compared with the sum of the account's entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub account_id: AccountId,
    pub stored_balance: Decimal,
    pub computed_balance: Decimal,
    pub difference: Decimal,
    pub entry_count: usize,
    pub consistent: bool,
}

/// The credit ledger.
#[derive(Clone)]
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    config: Arc<LedgerConfig>,
    metrics: Arc<LedgerMetrics>,
    resolver: AccountResolver,
    poster: EntryPoster,
    mutator: EntryMutator,
    adjuster: BalanceAdjuster,
}

impl LedgerEngine {
    /// Create a ledger engine over `store`.
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        let config = Arc::new(config);
        let resolver = AccountResolver::new(store.clone());

        Self {
            poster: EntryPoster::new(resolver.clone(), config.clone()),
            mutator: EntryMutator::new(config.clone()),
            adjuster: BalanceAdjuster::new(config.clone()),
            resolver,
            store,
            config,
            metrics: Arc::new(LedgerMetrics::new()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<LedgerMetrics> {
        &self.metrics
    }

    /// Find or create the account for a subject and currency.
    ///
    /// Idempotent: an existing account is returned as is, without applying
    /// `enabled` or `initial_balance`.
    #[instrument(skip(self, request), fields(agency_id = %auth.agency_id))]
    pub async fn create_account(
        &self,
        auth: &AuthContext,
        request: CreateAccount,
    ) -> Result<AccountCreation> {
        auth.require_ledger_access()?;
        let subject = Subject::from_parts(request.client_id, request.operator_id)?;
        let currency = Currency::parse(&request.currency)?;
        let opening_balance = request
            .initial_balance
            .map(|balance| ensure_money_range(round_money(balance), "initial_balance"))
            .transpose()?
            .filter(|balance| !balance.is_zero());
        if opening_balance.is_some() {
            auth.require_admin()?;
        }
        self.resolver.authorize_subject(auth, &subject).await?;

        let mut tx = self.store.begin().await?;
        let result = async {
            let resolved = self
                .resolver
                .find_or_create(
                    &mut *tx,
                    auth.agency_id,
                    &subject,
                    &currency,
                    request.enabled.unwrap_or(true),
                )
                .await?;
            match opening_balance {
                Some(balance) if resolved.created => {
                    let (account, entry) = self
                        .adjuster
                        .open_in_tx(&mut *tx, auth.actor_id, resolved.account.id, balance)
                        .await?;
                    Ok::<_, LedgerError>(AccountCreation {
                        account,
                        created: true,
                        opening_entry: entry,
                    })
                }
                _ => Ok(AccountCreation {
                    account: resolved.account,
                    created: resolved.created,
                    opening_entry: None,
                }),
            }
        }
        .await;
        let creation = self.observe(finish(tx, result).await)?;

        if creation.created {
            self.metrics.account_created();
            if creation.opening_entry.is_some() {
                self.metrics.entry_posted();
            }
        }
        Ok(creation)
    }

    /// Accounts of the caller's agency, most recently updated first.
    #[instrument(skip(self, filter, page), fields(agency_id = %auth.agency_id))]
    pub async fn list_accounts(
        &self,
        auth: &AuthContext,
        filter: &AccountFilter,
        page: &PageRequest,
    ) -> Result<Page<CreditAccount>> {
        auth.require_ledger_access()?;
        self.store.list_accounts(auth.agency_id, filter, page).await
    }

    #[instrument(skip(self), fields(agency_id = %auth.agency_id))]
    pub async fn get_account(&self, auth: &AuthContext, id: AccountId) -> Result<CreditAccount> {
        auth.require_ledger_access()?;
        self.owned_account(auth, id).await
    }

    /// Enable or disable postings on an account.
    #[instrument(skip(self), fields(agency_id = %auth.agency_id))]
    pub async fn set_account_enabled(
        &self,
        auth: &AuthContext,
        id: AccountId,
        enabled: bool,
    ) -> Result<CreditAccount> {
        auth.require_admin()?;
        self.owned_account(auth, id).await?;

        let mut tx = self.store.begin().await?;
        let result = async {
            let mut account = tx
                .lock_account(id)
                .await?
                .ok_or(LedgerError::AccountNotFound(id))?;
            if account.enabled != enabled {
                tx.set_enabled(id, enabled).await?;
                account.enabled = enabled;
                account.updated_at = Utc::now();
            }
            Ok::<_, LedgerError>(account)
        }
        .await;
        let account = finish(tx, result).await?;

        info!(account_id = %id, enabled, "Credit account availability changed");
        Ok(account)
    }

    /// Post one entry and move its account's balance by the entry's signed amount.
    #[instrument(skip(self, request), fields(agency_id = %auth.agency_id))]
    pub async fn post_entry(&self, auth: &AuthContext, request: PostEntry) -> Result<PostedEntry> {
        auth.require_ledger_access()?;
        let posting = self.poster.validate(&request)?;
        self.poster.authorize(auth, &posting).await?;

        let mut tx = self.store.begin().await?;
        let result = self.poster.post_in_tx(&mut *tx, auth, posting).await;
        let outcome = self.observe(finish(tx, result).await)?;

        if outcome.account_created {
            self.metrics.account_created();
        }
        self.metrics.entry_posted();
        let posted = outcome.posted;
        info!(
            entry_id = %posted.entry.id,
            account_id = %posted.account.id,
            doc_type = %posted.entry.doc_type,
            amount = %posted.entry.amount,
            balance = %posted.account.balance,
            "Credit entry posted"
        );
        Ok(posted)
    }

    /// Entries of the caller's agency, newest first.
    #[instrument(skip(self, filter, page), fields(agency_id = %auth.agency_id))]
    pub async fn list_entries(
        &self,
        auth: &AuthContext,
        filter: &EntryFilter,
        page: &PageRequest,
    ) -> Result<Page<CreditEntry>> {
        auth.require_ledger_access()?;
        self.store.list_entries(auth.agency_id, filter, page).await
    }

    #[instrument(skip(self), fields(agency_id = %auth.agency_id))]
    pub async fn get_entry(&self, auth: &AuthContext, id: EntryId) -> Result<CreditEntry> {
        auth.require_ledger_access()?;
        self.owned_entry(auth, id).await
    }

    /// Edit an entry's concept, value date, doc type or reference.
    #[instrument(skip(self, patch), fields(agency_id = %auth.agency_id))]
    pub async fn update_entry(
        &self,
        auth: &AuthContext,
        id: EntryId,
        patch: EntryPatch,
    ) -> Result<UpdatedEntry> {
        auth.require_admin()?;
        let patch = self.mutator.validate(&patch)?;
        self.owned_entry(auth, id).await?;

        let mut tx = self.store.begin().await?;
        let result = self.mutator.update_in_tx(&mut *tx, auth, id, patch).await;
        let updated = self.observe(finish(tx, result).await)?;

        let reclassified = !updated.balance_delta.is_zero();
        self.metrics.entry_edited(reclassified);
        info!(
            entry_id = %id,
            doc_type = %updated.entry.doc_type,
            balance_delta = %updated.balance_delta,
            "Credit entry updated"
        );
        Ok(updated)
    }

    /// Delete an entry and reverse its effect on the balance.
    ///
    /// Entries linked to a receipt, operator due or booking are never
    /// deleted; investment-linked entries only with `allow_linked`.
    #[instrument(skip(self), fields(agency_id = %auth.agency_id))]
    pub async fn delete_entry(
        &self,
        auth: &AuthContext,
        id: EntryId,
        allow_linked: bool,
    ) -> Result<DeletedEntry> {
        auth.require_admin()?;
        let entry = self.owned_entry(auth, id).await?;
        self.observe(ensure_deletable(&entry, allow_linked))?;

        let mut tx = self.store.begin().await?;
        let result = self.mutator.delete_in_tx(&mut *tx, auth, id, allow_linked).await;
        let deleted = self.observe(finish(tx, result).await)?;

        self.metrics.entry_deleted();
        info!(
            entry_id = %id,
            account_id = %deleted.account.id,
            balance_delta = %deleted.balance_delta,
            "Credit entry deleted"
        );
        Ok(deleted)
    }

    /// Move an account to a target balance through one adjust entry.
    #[instrument(skip(self, request), fields(agency_id = %auth.agency_id))]
    pub async fn adjust_balance(
        &self,
        auth: &AuthContext,
        account_id: AccountId,
        request: AdjustBalance,
    ) -> Result<AdjustmentOutcome> {
        auth.require_admin()?;
        let adjustment = self.adjuster.validate(&request)?;
        self.owned_account(auth, account_id).await?;

        let mut tx = self.store.begin().await?;
        let result = self
            .adjuster
            .adjust_in_tx(&mut *tx, auth, account_id, adjustment)
            .await;
        let outcome = self.observe(finish(tx, result).await)?;

        self.metrics.adjustment(outcome.changed);
        if outcome.changed {
            info!(
                account_id = %account_id,
                previous_balance = %outcome.previous_balance,
                target_balance = %outcome.target_balance,
                "Credit account balance adjusted"
            );
        }
        Ok(outcome)
    }

    /// Compare an account's stored balance with the signed sum of its entries.
    #[instrument(skip(self), fields(agency_id = %auth.agency_id))]
    pub async fn reconcile_account(
        &self,
        auth: &AuthContext,
        id: AccountId,
    ) -> Result<ReconciliationReport> {
        auth.require_ledger_access()?;
        self.owned_account(auth, id).await?;

        let mut tx = self.store.begin().await?;
        let result = async {
            let account = tx
                .lock_account(id)
                .await?
                .ok_or(LedgerError::AccountNotFound(id))?;
            let entries = tx.account_entries(id).await?;
            Ok::<_, LedgerError>((account, entries))
        }
        .await;
        let (account, entries) = finish(tx, result).await?;

        let overflow = || LedgerError::Internal(format!("entry sum of account {} overflowed", id));
        let computed_balance = entries
            .iter()
            .try_fold(Decimal::ZERO, |sum, entry| sum.checked_add(entry.signed_amount()))
            .map(round_money)
            .ok_or_else(overflow)?;
        let difference = account
            .balance
            .checked_sub(computed_balance)
            .ok_or_else(overflow)?;
        let report = ReconciliationReport {
            account_id: id,
            stored_balance: account.balance,
            computed_balance,
            difference,
            entry_count: entries.len(),
            consistent: difference.is_zero(),
        };
        if !report.consistent {
            warn!(
                account_id = %id,
                stored = %report.stored_balance,
                computed = %report.computed_balance,
                "Credit account balance drift detected"
            );
        }
        Ok(report)
    }

    async fn owned_account(&self, auth: &AuthContext, id: AccountId) -> Result<CreditAccount> {
        let account = self
            .store
            .find_account(id)
            .await?
            .ok_or(LedgerError::AccountNotFound(id))?;
        auth.ensure_agency(account.agency_id, "credit account")?;
        Ok(account)
    }

    async fn owned_entry(&self, auth: &AuthContext, id: EntryId) -> Result<CreditEntry> {
        let entry = self
            .store
            .find_entry(id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))?;
        auth.ensure_agency(entry.agency_id, "credit entry")?;
        Ok(entry)
    }

    /// Count and log refused operations.
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            match err.kind() {
                ErrorKind::Conflict => {
                    self.metrics.conflict();
                    warn!(error = %err, "Ledger operation refused");
                }
                ErrorKind::Transient => {
                    self.metrics.conflict();
                    warn!(error = %err, "Ledger transaction conflict");
                }
                _ => {}
            }
        }
        result
    }
}
