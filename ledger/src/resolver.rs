//! Account resolution: explicit account ids and find-or-create by subject.

use std::sync::Arc;

use ofistur_common::{AgencyId, AuthContext, Currency, LedgerError, Result, Subject};
use tracing::{debug, info};

use crate::account::CreditAccount;
use crate::entry::AccountTarget;
use crate::store::{AgencyCounter, LedgerStore, LedgerTx};

/// Account resolved inside a transaction.
#[derive(Debug, Clone)]
pub struct ResolvedAccount {
    pub account: CreditAccount,
    /// The account was created by this transaction.
    pub created: bool,
}

/// Maps posting targets to accounts.
#[derive(Clone)]
pub struct AccountResolver {
    store: Arc<dyn LedgerStore>,
}

impl AccountResolver {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Ownership checks that run before any transaction is opened.
    pub async fn authorize_target(&self, auth: &AuthContext, target: &AccountTarget) -> Result<()> {
        match target {
            AccountTarget::Account(id) => {
                let account = self
                    .store
                    .find_account(*id)
                    .await?
                    .ok_or(LedgerError::AccountNotFound(*id))?;
                auth.ensure_agency(account.agency_id, "credit account")
            }
            AccountTarget::Subject(subject) => self.authorize_subject(auth, subject).await,
        }
    }

    /// The subject must exist and belong to the caller's agency.
    pub async fn authorize_subject(&self, auth: &AuthContext, subject: &Subject) -> Result<()> {
        match self.store.subject_agency(subject).await? {
            Some(owner) => auth.ensure_agency(owner, &subject.to_string()),
            None => Err(LedgerError::forbidden(format!(
                "{} is not a known client or operator",
                subject
            ))),
        }
    }

    /// Resolve the account a posting lands on. Disabled accounts are refused.
    pub async fn resolve_for_posting(
        &self,
        tx: &mut dyn LedgerTx,
        auth: &AuthContext,
        target: &AccountTarget,
        currency: &Currency,
    ) -> Result<ResolvedAccount> {
        let resolved = match target {
            AccountTarget::Account(id) => {
                let account = tx
                    .lock_account(*id)
                    .await?
                    .ok_or(LedgerError::AccountNotFound(*id))?;
                auth.ensure_agency(account.agency_id, "credit account")?;
                ResolvedAccount {
                    account,
                    created: false,
                }
            }
            AccountTarget::Subject(subject) => {
                self.find_or_create(tx, auth.agency_id, subject, currency, true)
                    .await?
            }
        };

        if !resolved.account.can_post() {
            return Err(LedgerError::conflict(format!(
                "credit account {} is disabled",
                resolved.account.id
            )));
        }
        Ok(resolved)
    }

    /// Return the account for `(agency, subject, currency)`, creating it if absent.
    ///
    /// Concurrent callers serialize on the key lock; a caller whose insert
    /// loses a race re-reads the winner's account.
    pub async fn find_or_create(
        &self,
        tx: &mut dyn LedgerTx,
        agency_id: AgencyId,
        subject: &Subject,
        currency: &Currency,
        enabled: bool,
    ) -> Result<ResolvedAccount> {
        tx.lock_subject_key(agency_id, subject, currency).await?;

        if let Some(account) = tx.find_account_by_key(agency_id, subject, currency).await? {
            return Ok(ResolvedAccount {
                account,
                created: false,
            });
        }

        let number = tx
            .next_agency_counter(agency_id, AgencyCounter::CreditAccount)
            .await?;
        let mut account = CreditAccount::new(agency_id, number, *subject, currency.clone());
        account.enabled = enabled;

        if tx.insert_account(&account).await? {
            info!(
                account_id = %account.id,
                agency_id = %agency_id,
                subject = %subject,
                currency = %currency,
                "Credit account created"
            );
            return Ok(ResolvedAccount {
                account,
                created: true,
            });
        }

        debug!(subject = %subject, currency = %currency, "Account key taken, re-reading");
        tx.find_account_by_key(agency_id, subject, currency)
            .await?
            .map(|account| ResolvedAccount {
                account,
                created: false,
            })
            .ok_or_else(|| {
                LedgerError::StorageConflict(format!(
                    "account for {} in {} exists but is not visible",
                    subject, currency
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;
    use ofistur_common::{ClientId, Role, UserId};

    fn setup() -> (Arc<MemoryLedgerStore>, AccountResolver) {
        let store = Arc::new(MemoryLedgerStore::new());
        store.register_client(AgencyId(1), ClientId(7));
        store.register_client(AgencyId(2), ClientId(8));
        let resolver = AccountResolver::new(store.clone());
        (store, resolver)
    }

    #[tokio::test]
    async fn test_find_or_create_is_idempotent() {
        let (store, resolver) = setup();
        let subject = Subject::Client(ClientId(7));

        let mut tx = store.begin().await.unwrap();
        let first = resolver
            .find_or_create(&mut *tx, AgencyId(1), &subject, &Currency::ars(), true)
            .await
            .unwrap();
        let second = resolver
            .find_or_create(&mut *tx, AgencyId(1), &subject, &Currency::ars(), true)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.account.id, second.account.id);
        assert_eq!(first.account.agency_account_number, 1);
        assert_eq!(store.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_foreign_subject_rejected() {
        let (_store, resolver) = setup();
        let auth = AuthContext::new(UserId(1), AgencyId(1), Role::Administrative);

        assert!(resolver
            .authorize_subject(&auth, &Subject::Client(ClientId(7)))
            .await
            .is_ok());
        let err = resolver
            .authorize_subject(&auth, &Subject::Client(ClientId(8)))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");
        let err = resolver
            .authorize_subject(&auth, &Subject::Client(ClientId(99)))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_disabled_account_refuses_postings() {
        let (store, resolver) = setup();
        let auth = AuthContext::new(UserId(1), AgencyId(1), Role::Seller);
        let subject = Subject::Client(ClientId(7));

        let mut tx = store.begin().await.unwrap();
        let created = resolver
            .find_or_create(&mut *tx, AgencyId(1), &subject, &Currency::usd(), false)
            .await
            .unwrap();
        let err = resolver
            .resolve_for_posting(
                &mut *tx,
                &auth,
                &AccountTarget::Account(created.account.id),
                &Currency::usd(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
    }
}
