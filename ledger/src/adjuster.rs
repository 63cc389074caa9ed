//! Balance adjustments: move an account to a target balance with one
//! compensating entry.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use ofistur_common::{
    ensure_money_range, round_money, within_money_range, AccountId, AuthContext, EntryId,
    LedgerError, LocaleAmount, Result, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::CreditAccount;
use crate::balance::BalanceUpdate;
use crate::config::LedgerConfig;
use crate::doc_type::DocType;
use crate::entry::{CreditEntry, EntryLinks};
use crate::poster::{optional_text, required_text};
use crate::store::{AgencyCounter, LedgerTx};

/// Adjustment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustBalance {
    /// Desired balance, as a number or locale-formatted text.
    pub target_balance: LocaleAmount,
    pub reason: String,
    pub value_date: Option<NaiveDate>,
    pub reference: Option<String>,
}

impl AdjustBalance {
    pub fn new(target_balance: impl Into<LocaleAmount>, reason: impl Into<String>) -> Self {
        Self {
            target_balance: target_balance.into(),
            reason: reason.into(),
            value_date: None,
            reference: None,
        }
    }
}

/// Result of an adjustment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentOutcome {
    /// False when the account already held the target balance.
    pub changed: bool,
    pub account: CreditAccount,
    pub entry: Option<CreditEntry>,
    pub previous_balance: Decimal,
    pub target_balance: Decimal,
    pub delta: Decimal,
}

/// Adjustment parameters after validation.
#[derive(Debug, Clone)]
pub struct ValidatedAdjustment {
    pub target: Decimal,
    pub concept: String,
    pub reference: String,
    pub value_date: Option<NaiveDate>,
}

/// Applies balance adjustments.
#[derive(Clone)]
pub struct BalanceAdjuster {
    config: Arc<LedgerConfig>,
}

impl BalanceAdjuster {
    pub fn new(config: Arc<LedgerConfig>) -> Self {
        Self { config }
    }

    pub fn validate(&self, request: &AdjustBalance) -> Result<ValidatedAdjustment> {
        let target = request.target_balance.parse().map_err(|err| {
            LedgerError::validation(format!("invalid target balance: {}", err), "target_balance")
        })?;
        let target = ensure_money_range(round_money(target), "target_balance")?;
        let reason = required_text(&request.reason, "reason")?;

        Ok(ValidatedAdjustment {
            target,
            concept: format!("{}{}", self.config.adjustment_concept_prefix, reason),
            reference: optional_text(request.reference.as_deref())
                .unwrap_or_else(|| self.config.adjustment_reference.clone()),
            value_date: request.value_date,
        })
    }

    /// Move the account to the target balance inside `tx`.
    pub async fn adjust_in_tx(
        &self,
        tx: &mut dyn LedgerTx,
        auth: &AuthContext,
        account_id: AccountId,
        adjustment: ValidatedAdjustment,
    ) -> Result<AdjustmentOutcome> {
        let update = BalanceUpdate::to(tx, account_id, adjustment.target).await?;
        auth.ensure_agency(update.account().agency_id, "credit account")?;

        let previous_balance = update.before;
        let delta = update.change();
        if delta.is_zero() {
            return Ok(AdjustmentOutcome {
                changed: false,
                account: update.account().clone(),
                entry: None,
                previous_balance,
                target_balance: update.after,
                delta,
            });
        }

        let entry = record_adjustment(
            tx,
            update.account(),
            delta,
            adjustment.concept,
            Some(adjustment.reference),
            adjustment.value_date,
            auth.actor_id,
        )
        .await?;
        let target_balance = update.after;
        let account = update.write(tx).await?;

        Ok(AdjustmentOutcome {
            changed: true,
            account,
            entry: Some(entry),
            previous_balance,
            target_balance,
            delta,
        })
    }

    /// Give a freshly created account its opening balance.
    pub async fn open_in_tx(
        &self,
        tx: &mut dyn LedgerTx,
        actor: UserId,
        account_id: AccountId,
        opening_balance: Decimal,
    ) -> Result<(CreditAccount, Option<CreditEntry>)> {
        let update = BalanceUpdate::to(tx, account_id, opening_balance).await?;
        let delta = update.change();
        if delta.is_zero() {
            return Ok((update.account().clone(), None));
        }

        let entry = record_adjustment(
            tx,
            update.account(),
            delta,
            self.config.opening_balance_concept.clone(),
            Some(self.config.adjustment_reference.clone()),
            None,
            actor,
        )
        .await?;
        let account = update.write(tx).await?;
        Ok((account, Some(entry)))
    }
}

/// Insert the adjust_up/adjust_down entry whose signed effect equals `delta`.
async fn record_adjustment(
    tx: &mut dyn LedgerTx,
    account: &CreditAccount,
    delta: Decimal,
    concept: String,
    reference: Option<String>,
    value_date: Option<NaiveDate>,
    actor: UserId,
) -> Result<CreditEntry> {
    if !within_money_range(delta) {
        return Err(LedgerError::conflict(format!(
            "adjustment of {} on account {} exceeds the maximum entry amount",
            delta, account.id
        )));
    }
    let number = tx
        .next_agency_counter(account.agency_id, AgencyCounter::CreditEntry)
        .await?;
    let now = Utc::now();
    let entry = CreditEntry {
        id: EntryId::new(),
        agency_entry_number: number,
        agency_id: account.agency_id,
        account_id: account.id,
        amount: delta.abs(),
        currency: account.currency.clone(),
        doc_type: DocType::adjustment_for(delta),
        concept,
        value_date,
        reference,
        links: EntryLinks::default(),
        created_by: actor,
        created_at: now,
        updated_at: now,
    };
    tx.insert_entry(&entry).await?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LedgerStore, MemoryLedgerStore};
    use ofistur_common::{AgencyId, ClientId, Currency, Role, Subject, MAX_MONEY};
    use rust_decimal_macros::dec;

    fn adjuster() -> BalanceAdjuster {
        BalanceAdjuster::new(Arc::new(LedgerConfig::default()))
    }

    #[test]
    fn test_validation() {
        let adjustment = adjuster()
            .validate(&AdjustBalance::new("1.234,567", " cierre "))
            .unwrap();
        assert_eq!(adjustment.target, dec!(1234.57));
        assert_eq!(adjustment.concept, "Ajuste manual: cierre");
        assert_eq!(adjustment.reference, "AJUSTE_SALDO");

        let err = adjuster().validate(&AdjustBalance::new("1.2.3", "x")).unwrap_err();
        assert_eq!(err.field(), Some("target_balance"));
        let err = adjuster().validate(&AdjustBalance::new("10", " ")).unwrap_err();
        assert_eq!(err.field(), Some("reason"));

        for target in [
            AdjustBalance::new("10.000.000.000.000.000,00", "x"),
            AdjustBalance::new(Decimal::MAX, "x"),
            AdjustBalance::new(-Decimal::MAX, "x"),
        ] {
            let err = adjuster().validate(&target).unwrap_err();
            assert_eq!(err.field(), Some("target_balance"));
        }
    }

    #[tokio::test]
    async fn test_oversized_adjustment_entry_is_refused() {
        let store = MemoryLedgerStore::new();
        let mut account =
            CreditAccount::new(AgencyId(1), 1, Subject::Client(ClientId(1)), Currency::ars());
        account.balance = -MAX_MONEY;
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&account).await.unwrap();

        let auth = AuthContext::new(UserId(3), AgencyId(1), Role::Manager);
        let adjustment = adjuster()
            .validate(&AdjustBalance::new(MAX_MONEY, "swing"))
            .unwrap();
        let err = adjuster()
            .adjust_in_tx(&mut *tx, &auth, account.id, adjustment)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[tokio::test]
    async fn test_downward_adjustment() {
        let store = MemoryLedgerStore::new();
        let mut account =
            CreditAccount::new(AgencyId(1), 1, Subject::Client(ClientId(1)), Currency::ars());
        account.balance = dec!(100);
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&account).await.unwrap();

        let auth = AuthContext::new(UserId(3), AgencyId(1), Role::Manager);
        let adjustment = adjuster().validate(&AdjustBalance::new("40", "recount")).unwrap();
        let outcome = adjuster()
            .adjust_in_tx(&mut *tx, &auth, account.id, adjustment)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.delta, dec!(-60));
        assert_eq!(outcome.account.balance, dec!(40));
        let entry = outcome.entry.unwrap();
        assert_eq!(entry.doc_type, DocType::AdjustDown);
        assert_eq!(entry.amount, dec!(60));
        assert_eq!(entry.created_by, UserId(3));
    }
}
