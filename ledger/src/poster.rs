//! Entry posting.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use ofistur_common::{
    ensure_money_range, ensure_money_scale, AuthContext, Currency, EntryId, LedgerError, Result,
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::account::CreditAccount;
use crate::balance::BalanceUpdate;
use crate::config::LedgerConfig;
use crate::doc_type::{signed_delta, DocType};
use crate::entry::{AccountTarget, CreditEntry, EntryLinks, PostEntry};
use crate::resolver::AccountResolver;
use crate::store::{AgencyCounter, LedgerTx};

/// A committed posting and the account it landed on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostedEntry {
    pub entry: CreditEntry,
    pub account: CreditAccount,
}

/// Posting result before commit.
#[derive(Debug, Clone)]
pub struct PostOutcome {
    pub posted: PostedEntry,
    pub account_created: bool,
}

/// A posting request after validation.
#[derive(Debug, Clone)]
pub struct ValidatedPosting {
    pub target: AccountTarget,
    pub amount: Decimal,
    pub currency: Currency,
    pub concept: String,
    pub doc_type: DocType,
    pub value_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub links: EntryLinks,
}

/// Non-empty trimmed text, or a validation error on `field`.
pub(crate) fn required_text(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::validation(format!("{} is required", field), field));
    }
    Ok(trimmed.to_string())
}

/// Trimmed text, `None` when blank.
pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse a doc type, refusing unknown tags when `strict`.
pub(crate) fn checked_doc_type(raw: Option<&str>, strict: bool) -> Result<DocType> {
    let doc_type = DocType::parse_or_default(raw);
    if strict && !doc_type.is_known() {
        return Err(LedgerError::validation(
            format!("unknown doc type '{}'", doc_type),
            "doc_type",
        ));
    }
    Ok(doc_type)
}

/// Validates postings and applies them.
#[derive(Clone)]
pub struct EntryPoster {
    resolver: AccountResolver,
    config: Arc<LedgerConfig>,
}

impl EntryPoster {
    pub fn new(resolver: AccountResolver, config: Arc<LedgerConfig>) -> Self {
        Self { resolver, config }
    }

    /// Check a request without touching storage.
    pub fn validate(&self, request: &PostEntry) -> Result<ValidatedPosting> {
        let amount = ensure_money_scale(request.amount, "amount")?;
        if amount <= Decimal::ZERO {
            return Err(LedgerError::validation(
                "amount must be greater than zero",
                "amount",
            ));
        }
        let amount = ensure_money_range(amount, "amount")?;

        Ok(ValidatedPosting {
            target: request.target()?,
            amount,
            currency: Currency::parse(&request.currency)?,
            concept: required_text(&request.concept, "concept")?,
            doc_type: checked_doc_type(request.doc_type.as_deref(), self.config.strict_doc_types)?,
            value_date: request.value_date,
            reference: optional_text(request.reference.as_deref()),
            links: request.links,
        })
    }

    /// Pre-transaction authorization of the posting target.
    pub async fn authorize(&self, auth: &AuthContext, posting: &ValidatedPosting) -> Result<()> {
        self.resolver.authorize_target(auth, &posting.target).await
    }

    /// Apply a validated posting inside `tx`.
    pub async fn post_in_tx(
        &self,
        tx: &mut dyn LedgerTx,
        auth: &AuthContext,
        posting: ValidatedPosting,
    ) -> Result<PostOutcome> {
        let resolved = self
            .resolver
            .resolve_for_posting(tx, auth, &posting.target, &posting.currency)
            .await?;

        if resolved.account.currency != posting.currency {
            return Err(LedgerError::validation(
                format!(
                    "currency {} does not match account currency {}",
                    posting.currency, resolved.account.currency
                ),
                "currency",
            ));
        }

        let delta = signed_delta(posting.amount, &posting.doc_type);
        let update = BalanceUpdate::by(tx, resolved.account.id, delta).await?;
        update.enforce(self.config.negative_balance_policy, &posting.doc_type)?;

        let agency_id = resolved.account.agency_id;
        let number = tx
            .next_agency_counter(agency_id, AgencyCounter::CreditEntry)
            .await?;
        let now = Utc::now();
        let entry = CreditEntry {
            id: EntryId::new(),
            agency_entry_number: number,
            agency_id,
            account_id: resolved.account.id,
            amount: posting.amount,
            currency: posting.currency,
            doc_type: posting.doc_type,
            concept: posting.concept,
            value_date: posting.value_date,
            reference: posting.reference,
            links: posting.links,
            created_by: auth.actor_id,
            created_at: now,
            updated_at: now,
        };
        tx.insert_entry(&entry).await?;
        let account = update.write(tx).await?;

        Ok(PostOutcome {
            posted: PostedEntry { entry, account },
            account_created: resolved.created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;
    use ofistur_common::{ClientId, Subject};
    use rust_decimal_macros::dec;

    fn poster(config: LedgerConfig) -> EntryPoster {
        let store = Arc::new(MemoryLedgerStore::new());
        EntryPoster::new(AccountResolver::new(store), Arc::new(config))
    }

    fn request(amount: Decimal, doc_type: Option<&str>) -> PostEntry {
        PostEntry::for_subject(Subject::Client(ClientId(1)), amount, "ars", " Pago ", doc_type)
    }

    #[test]
    fn test_validation_normalizes() {
        let posting = poster(LedgerConfig::default())
            .validate(&request(dec!(10.50), Some("RECEIPT")).with_reference("  "))
            .unwrap();
        assert_eq!(posting.amount, dec!(10.50));
        assert_eq!(posting.currency, Currency::ars());
        assert_eq!(posting.concept, "Pago");
        assert_eq!(posting.doc_type, DocType::Receipt);
        assert_eq!(posting.reference, None);
    }

    #[test]
    fn test_validation_rejects() {
        let poster = poster(LedgerConfig::default());
        for amount in [
            dec!(0),
            dec!(-5),
            dec!(0.004),
            dec!(10.005),
            dec!(10000000000000000),
            Decimal::MAX,
        ] {
            let err = poster.validate(&request(amount, None)).unwrap_err();
            assert_eq!(err.field(), Some("amount"));
        }

        let mut blank = request(dec!(1), None);
        blank.concept = "   ".to_string();
        assert_eq!(poster.validate(&blank).unwrap_err().field(), Some("concept"));

        let err = poster.validate(&request(dec!(1), Some("refund"))).unwrap_err();
        assert_eq!(err.field(), Some("doc_type"));

        let mut no_subject = request(dec!(1), None);
        no_subject.client_id = None;
        assert_eq!(poster.validate(&no_subject).unwrap_err().field(), Some("subject"));
    }

    #[test]
    fn test_lenient_doc_types() {
        let poster = poster(LedgerConfig {
            strict_doc_types: false,
            ..Default::default()
        });
        let posting = poster.validate(&request(dec!(1), Some("refund"))).unwrap();
        assert_eq!(posting.doc_type, DocType::Other("refund".to_string()));
        assert_eq!(posting.doc_type.sign(), 1);
    }
}
