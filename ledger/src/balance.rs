//! Transactional balance updates.
//!
//! Every balance change starts from the account row as read under the active
//! transaction, never from a copy loaded earlier in the request.

use chrono::Utc;
use ofistur_common::{round_money, within_money_range, AccountId, LedgerError, Result};
use rust_decimal::Decimal;

use crate::account::CreditAccount;
use crate::config::NegativeBalancePolicy;
use crate::doc_type::DocType;
use crate::store::LedgerTx;

/// A pending balance change on one locked account.
#[derive(Debug, Clone)]
pub struct BalanceUpdate {
    account: CreditAccount,
    /// Balance read under the transaction.
    pub before: Decimal,
    /// Balance that `write` will store.
    pub after: Decimal,
}

impl BalanceUpdate {
    /// Re-read the account and add `delta` to its balance.
    pub async fn by(tx: &mut dyn LedgerTx, account_id: AccountId, delta: Decimal) -> Result<Self> {
        let account = lock(tx, account_id).await?;
        let before = account.balance;
        let after = before
            .checked_add(delta)
            .map(round_money)
            .filter(|after| within_money_range(*after))
            .ok_or_else(|| out_of_range(&account))?;
        Ok(Self {
            after,
            before,
            account,
        })
    }

    /// Re-read the account and set its balance to `target`.
    pub async fn to(tx: &mut dyn LedgerTx, account_id: AccountId, target: Decimal) -> Result<Self> {
        let account = lock(tx, account_id).await?;
        let after = round_money(target);
        if !within_money_range(after) {
            return Err(out_of_range(&account));
        }
        Ok(Self {
            before: account.balance,
            after,
            account,
        })
    }

    /// Signed change this update applies.
    pub fn change(&self) -> Decimal {
        self.after - self.before
    }

    /// The account as read under the transaction.
    pub fn account(&self) -> &CreditAccount {
        &self.account
    }

    /// Refuse the update if it breaks the negative-balance policy for an entry
    /// of `doc_type`.
    pub fn enforce(&self, policy: NegativeBalancePolicy, doc_type: &DocType) -> Result<()> {
        let restricted = policy == NegativeBalancePolicy::RejectForClients
            && self.account.subject.is_client()
            && !doc_type.is_adjustment();
        if restricted && self.after < Decimal::ZERO && self.change() < Decimal::ZERO {
            return Err(LedgerError::conflict(format!(
                "insufficient balance: account {} would go from {} to {}",
                self.account.id, self.before, self.after
            )));
        }
        Ok(())
    }

    /// Store the new balance and return the updated account.
    pub async fn write(self, tx: &mut dyn LedgerTx) -> Result<CreditAccount> {
        let mut account = self.account;
        tx.set_balance(account.id, self.after).await?;
        account.balance = self.after;
        account.updated_at = Utc::now();
        Ok(account)
    }
}

fn out_of_range(account: &CreditAccount) -> LedgerError {
    LedgerError::conflict(format!(
        "balance of account {} would leave the supported range",
        account.id
    ))
}

async fn lock(tx: &mut dyn LedgerTx, account_id: AccountId) -> Result<CreditAccount> {
    tx.lock_account(account_id)
        .await?
        .ok_or(LedgerError::AccountNotFound(account_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LedgerStore, MemoryLedgerStore};
    use ofistur_common::{AgencyId, ClientId, Currency, OperatorId, Subject, MAX_MONEY};
    use rust_decimal_macros::dec;

    async fn store_with(subject: Subject, balance: Decimal) -> (MemoryLedgerStore, AccountId) {
        let store = MemoryLedgerStore::new();
        let mut account = CreditAccount::new(AgencyId(1), 1, subject, Currency::ars());
        account.balance = balance;
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&account).await.unwrap();
        tx.commit().await.unwrap();
        (store, account.id)
    }

    #[tokio::test]
    async fn test_delta_reads_current_balance() {
        let (store, id) = store_with(Subject::Client(ClientId(1)), dec!(50)).await;

        let mut tx = store.begin().await.unwrap();
        let update = BalanceUpdate::by(&mut *tx, id, dec!(-20.5)).await.unwrap();
        assert_eq!(update.before, dec!(50));
        assert_eq!(update.after, dec!(29.5));
        let account = update.write(&mut *tx).await.unwrap();
        assert_eq!(account.balance, dec!(29.5));

        // A second update in the same transaction sees the first one.
        let update = BalanceUpdate::by(&mut *tx, id, dec!(0.5)).await.unwrap();
        assert_eq!(update.before, dec!(29.5));
        update.write(&mut *tx).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.find_account(id).await.unwrap().unwrap().balance, dec!(30));
    }

    #[tokio::test]
    async fn test_assign_reports_change() {
        let (store, id) = store_with(Subject::Client(ClientId(1)), dec!(50)).await;
        let mut tx = store.begin().await.unwrap();
        let update = BalanceUpdate::to(&mut *tx, id, dec!(75)).await.unwrap();
        assert_eq!(update.change(), dec!(25));
    }

    #[tokio::test]
    async fn test_balance_range_is_enforced() {
        let (store, id) = store_with(Subject::Client(ClientId(1)), MAX_MONEY).await;

        let mut tx = store.begin().await.unwrap();
        let err = BalanceUpdate::by(&mut *tx, id, dec!(0.01)).await.unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
        let err = BalanceUpdate::by(&mut *tx, id, Decimal::MAX).await.unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
        let err = BalanceUpdate::to(&mut *tx, id, -Decimal::MAX).await.unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");

        let update = BalanceUpdate::by(&mut *tx, id, -MAX_MONEY).await.unwrap();
        assert_eq!(update.after, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_missing_account() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = BalanceUpdate::by(&mut *tx, AccountId::new(), dec!(1)).await.unwrap_err();
        assert_eq!(err.error_code(), "ACCOUNT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_negative_policy() {
        let (store, id) = store_with(Subject::Client(ClientId(1)), dec!(10)).await;
        let mut tx = store.begin().await.unwrap();
        let update = BalanceUpdate::by(&mut *tx, id, dec!(-30)).await.unwrap();

        assert!(update
            .enforce(NegativeBalancePolicy::Allow, &DocType::Investment)
            .is_ok());
        assert!(update
            .enforce(NegativeBalancePolicy::RejectForClients, &DocType::Investment)
            .is_err());
        assert!(update
            .enforce(NegativeBalancePolicy::RejectForClients, &DocType::AdjustDown)
            .is_ok());
        drop(tx);

        let (store, id) = store_with(Subject::Operator(OperatorId(1)), dec!(10)).await;
        let mut tx = store.begin().await.unwrap();
        let update = BalanceUpdate::by(&mut *tx, id, dec!(-30)).await.unwrap();
        assert!(update
            .enforce(NegativeBalancePolicy::RejectForClients, &DocType::Investment)
            .is_ok());
    }
}
