//! Entry edits and deletions.
//!
//! Amount and account of an entry never change after posting. A doc type edit
//! that flips the entry's sign moves the balance by `amount * (new - old)`;
//! a deletion removes the entry's signed effect.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use ofistur_common::{AuthContext, EntryId, LedgerError, Result};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::account::CreditAccount;
use crate::balance::BalanceUpdate;
use crate::config::LedgerConfig;
use crate::doc_type::DocType;
use crate::entry::{CreditEntry, EntryPatch};
use crate::poster::{checked_doc_type, required_text};
use crate::store::LedgerTx;

/// An edited entry and its account after the edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedEntry {
    pub entry: CreditEntry,
    pub account: CreditAccount,
    /// Balance change caused by the edit; zero unless the sign flipped.
    pub balance_delta: Decimal,
}

/// A removed entry and its account after removal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletedEntry {
    pub deleted: CreditEntry,
    pub account: CreditAccount,
    pub balance_delta: Decimal,
}

/// An entry patch after validation.
#[derive(Debug, Clone, Default)]
pub struct ValidatedPatch {
    pub concept: Option<String>,
    pub value_date: Option<NaiveDate>,
    pub doc_type: Option<DocType>,
    /// `Some(None)` clears the reference.
    pub reference: Option<Option<String>>,
}

/// Edits and deletes entries.
#[derive(Clone)]
pub struct EntryMutator {
    config: Arc<LedgerConfig>,
}

impl EntryMutator {
    pub fn new(config: Arc<LedgerConfig>) -> Self {
        Self { config }
    }

    pub fn validate(&self, patch: &EntryPatch) -> Result<ValidatedPatch> {
        let concept = match patch.concept.as_deref() {
            Some(concept) => Some(required_text(concept, "concept")?),
            None => None,
        };
        let doc_type = match patch.doc_type.as_deref() {
            Some(raw) => Some(checked_doc_type(Some(raw), self.config.strict_doc_types)?),
            None => None,
        };
        let reference = patch.reference.as_deref().map(|reference| {
            let trimmed = reference.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        Ok(ValidatedPatch {
            concept,
            value_date: patch.value_date,
            doc_type,
            reference,
        })
    }

    /// Apply a patch inside `tx`.
    pub async fn update_in_tx(
        &self,
        tx: &mut dyn LedgerTx,
        auth: &AuthContext,
        entry_id: EntryId,
        patch: ValidatedPatch,
    ) -> Result<UpdatedEntry> {
        let mut entry = lock_entry(tx, auth, entry_id).await?;
        let original = entry.clone();

        if let Some(concept) = patch.concept {
            entry.concept = concept;
        }
        if let Some(value_date) = patch.value_date {
            entry.value_date = Some(value_date);
        }
        if let Some(reference) = patch.reference {
            entry.reference = reference;
        }
        if let Some(doc_type) = patch.doc_type {
            entry.doc_type = doc_type;
        }

        let sign_change = entry.doc_type.sign() - original.doc_type.sign();
        let balance_delta = entry
            .amount
            .checked_mul(Decimal::from(sign_change))
            .ok_or_else(|| {
                LedgerError::conflict(format!(
                    "reclassifying entry {} leaves the supported amount range",
                    entry.id
                ))
            })?;
        let account = if balance_delta.is_zero() {
            tx.lock_account(entry.account_id)
                .await?
                .ok_or(LedgerError::AccountNotFound(entry.account_id))?
        } else {
            let update = BalanceUpdate::by(tx, entry.account_id, balance_delta).await?;
            update.enforce(self.config.negative_balance_policy, &entry.doc_type)?;
            update.write(tx).await?
        };

        if entry != original {
            entry.updated_at = Utc::now();
            tx.update_entry(&entry).await?;
        }

        Ok(UpdatedEntry {
            entry,
            account,
            balance_delta,
        })
    }

    /// Remove an entry and reverse its effect inside `tx`.
    pub async fn delete_in_tx(
        &self,
        tx: &mut dyn LedgerTx,
        auth: &AuthContext,
        entry_id: EntryId,
        allow_linked: bool,
    ) -> Result<DeletedEntry> {
        let entry = lock_entry(tx, auth, entry_id).await?;
        ensure_deletable(&entry, allow_linked)?;

        let balance_delta = -entry.signed_amount();
        let account = BalanceUpdate::by(tx, entry.account_id, balance_delta)
            .await?
            .write(tx)
            .await?;
        tx.delete_entry(entry.id).await?;

        Ok(DeletedEntry {
            deleted: entry,
            account,
            balance_delta,
        })
    }
}

/// Refuse deleting entries that back another document.
pub fn ensure_deletable(entry: &CreditEntry, allow_linked: bool) -> Result<()> {
    match entry.links.deletion_blocker(allow_linked) {
        Some(link) => Err(LedgerError::conflict(format!(
            "entry {} is linked to a {} and cannot be deleted",
            entry.id, link
        ))),
        None => Ok(()),
    }
}

async fn lock_entry(
    tx: &mut dyn LedgerTx,
    auth: &AuthContext,
    entry_id: EntryId,
) -> Result<CreditEntry> {
    let entry = tx
        .lock_entry(entry_id)
        .await?
        .ok_or(LedgerError::EntryNotFound(entry_id))?;
    auth.ensure_agency(entry.agency_id, "credit entry")?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutator() -> EntryMutator {
        EntryMutator::new(Arc::new(LedgerConfig::default()))
    }

    #[test]
    fn test_patch_validation() {
        let patch = mutator()
            .validate(&EntryPatch {
                concept: Some(" nuevo ".to_string()),
                doc_type: Some("Investment".to_string()),
                reference: Some(" ".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(patch.concept.as_deref(), Some("nuevo"));
        assert_eq!(patch.doc_type, Some(DocType::Investment));
        assert_eq!(patch.reference, Some(None));

        let err = mutator()
            .validate(&EntryPatch {
                concept: Some(String::new()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.field(), Some("concept"));

        let err = mutator()
            .validate(&EntryPatch {
                doc_type: Some("bonus".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.field(), Some("doc_type"));
    }
}
