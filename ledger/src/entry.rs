//! Credit entries: absolute-amount movements whose sign comes from their doc type.

use chrono::{DateTime, NaiveDate, Utc};
use ofistur_common::{
    AccountId, AgencyId, BookingId, ClientId, Currency, EntryId, InvestmentId, OperatorDueId,
    OperatorId, ReceiptId, Subject, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::CreditAccount;
use crate::doc_type::{signed_delta, DocType};

/// References to back-office documents that produced an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLinks {
    pub booking_id: Option<BookingId>,
    pub receipt_id: Option<ReceiptId>,
    pub investment_id: Option<InvestmentId>,
    pub operator_due_id: Option<OperatorDueId>,
}

impl EntryLinks {
    /// Any link marks the entry as system-generated.
    pub fn is_linked(&self) -> bool {
        self.booking_id.is_some()
            || self.receipt_id.is_some()
            || self.investment_id.is_some()
            || self.operator_due_id.is_some()
    }

    /// The link that forbids deleting the entry, if any.
    ///
    /// Receipt, operator-due and booking links always block; an investment
    /// link blocks unless `allow_linked` is set.
    pub fn deletion_blocker(&self, allow_linked: bool) -> Option<&'static str> {
        if self.receipt_id.is_some() {
            Some("receipt")
        } else if self.operator_due_id.is_some() {
            Some("operator due")
        } else if self.booking_id.is_some() {
            Some("booking")
        } else if self.investment_id.is_some() && !allow_linked {
            Some("investment")
        } else {
            None
        }
    }
}

/// A single movement against a credit account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditEntry {
    /// Unique entry ID.
    pub id: EntryId,
    /// Per-agency sequence number shown to users.
    pub agency_entry_number: i64,
    /// Owning agency (same as the account's).
    pub agency_id: AgencyId,
    /// Account affected. Immutable.
    pub account_id: AccountId,
    /// Absolute amount. Immutable.
    pub amount: Decimal,
    /// Currency; equals the account's.
    pub currency: Currency,
    /// Drives the sign of the entry's effect.
    pub doc_type: DocType,
    pub concept: String,
    pub value_date: Option<NaiveDate>,
    pub reference: Option<String>,
    #[serde(flatten)]
    pub links: EntryLinks,
    /// User who posted the entry.
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditEntry {
    /// Current effect on the account balance.
    pub fn signed_amount(&self) -> Decimal {
        signed_delta(self.amount, &self.doc_type)
    }
}

/// Where a posting lands: an explicit account, or the (subject, currency) account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountTarget {
    Account(AccountId),
    Subject(Subject),
}

/// Entry posting request. The amount is a positive magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostEntry {
    pub account_id: Option<AccountId>,
    pub client_id: Option<ClientId>,
    pub operator_id: Option<OperatorId>,
    pub amount: Decimal,
    pub currency: String,
    pub concept: String,
    pub doc_type: Option<String>,
    pub value_date: Option<NaiveDate>,
    pub reference: Option<String>,
    #[serde(flatten)]
    pub links: EntryLinks,
}

impl PostEntry {
    /// Minimal posting against a subject; links and metadata default to empty.
    pub fn for_subject(
        subject: Subject,
        amount: Decimal,
        currency: impl Into<String>,
        concept: impl Into<String>,
        doc_type: Option<&str>,
    ) -> Self {
        Self {
            account_id: None,
            client_id: subject.client_id(),
            operator_id: subject.operator_id(),
            amount,
            currency: currency.into(),
            concept: concept.into(),
            doc_type: doc_type.map(str::to_string),
            value_date: None,
            reference: None,
            links: EntryLinks::default(),
        }
    }

    /// Minimal posting against an explicit account.
    pub fn for_account(
        account_id: AccountId,
        amount: Decimal,
        currency: impl Into<String>,
        concept: impl Into<String>,
        doc_type: Option<&str>,
    ) -> Self {
        Self {
            account_id: Some(account_id),
            client_id: None,
            operator_id: None,
            amount,
            currency: currency.into(),
            concept: concept.into(),
            doc_type: doc_type.map(str::to_string),
            value_date: None,
            reference: None,
            links: EntryLinks::default(),
        }
    }

    pub fn with_links(mut self, links: EntryLinks) -> Self {
        self.links = links;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// An explicit account id wins over subject fields.
    pub fn target(&self) -> ofistur_common::Result<AccountTarget> {
        match self.account_id {
            Some(id) => Ok(AccountTarget::Account(id)),
            None => Subject::from_parts(self.client_id, self.operator_id).map(AccountTarget::Subject),
        }
    }
}

/// Editable fields of an entry. `reference: Some("")` clears the reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPatch {
    pub concept: Option<String>,
    pub value_date: Option<NaiveDate>,
    pub doc_type: Option<String>,
    pub reference: Option<String>,
}

/// Optional filters for listing entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFilter {
    pub account_id: Option<AccountId>,
    pub client_id: Option<ClientId>,
    pub operator_id: Option<OperatorId>,
    pub currency: Option<Currency>,
    pub doc_type: Option<String>,
    pub booking_id: Option<BookingId>,
    pub receipt_id: Option<ReceiptId>,
    pub investment_id: Option<InvestmentId>,
    pub operator_due_id: Option<OperatorDueId>,
    pub value_date_from: Option<NaiveDate>,
    pub value_date_to: Option<NaiveDate>,
}

impl EntryFilter {
    /// Filter check for stores that evaluate in memory. `account` is the
    /// entry's owning account, used for subject filters.
    pub fn matches(&self, entry: &CreditEntry, account: Option<&CreditAccount>) -> bool {
        let subject = account.map(|a| a.subject);
        let in_date_range = |from: Option<NaiveDate>, to: Option<NaiveDate>| match entry.value_date
        {
            Some(date) => from.map_or(true, |f| date >= f) && to.map_or(true, |t| date <= t),
            None => from.is_none() && to.is_none(),
        };

        self.account_id.map_or(true, |id| entry.account_id == id)
            && self
                .client_id
                .map_or(true, |id| subject == Some(Subject::Client(id)))
            && self
                .operator_id
                .map_or(true, |id| subject == Some(Subject::Operator(id)))
            && self.currency.as_ref().map_or(true, |c| &entry.currency == c)
            && self
                .doc_type
                .as_deref()
                .map_or(true, |d| entry.doc_type == DocType::parse(d))
            && self.booking_id.map_or(true, |id| entry.links.booking_id == Some(id))
            && self.receipt_id.map_or(true, |id| entry.links.receipt_id == Some(id))
            && self
                .investment_id
                .map_or(true, |id| entry.links.investment_id == Some(id))
            && self
                .operator_due_id
                .map_or(true, |id| entry.links.operator_due_id == Some(id))
            && in_date_range(self.value_date_from, self.value_date_to)
    }
}
