//! Credit account definitions.

use chrono::{DateTime, Utc};
use ofistur_common::{AccountId, AgencyId, ClientId, Currency, OperatorId, Subject};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Running signed balance of one subject, in one currency, within one agency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditAccount {
    /// Unique account identifier.
    pub id: AccountId,
    /// Per-agency sequence number shown to users.
    pub agency_account_number: i64,
    /// Owning agency.
    pub agency_id: AgencyId,
    /// Client or operator the balance is tracked against.
    pub subject: Subject,
    /// Account currency.
    pub currency: Currency,
    /// Signed balance; always the signed sum of the account's entries.
    pub balance: Decimal,
    /// Disabled accounts reject new postings.
    pub enabled: bool,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl CreditAccount {
    /// Create a new zero-balance, enabled account.
    pub fn new(
        agency_id: AgencyId,
        agency_account_number: i64,
        subject: Subject,
        currency: Currency,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: AccountId::new(),
            agency_account_number,
            agency_id,
            subject,
            currency,
            balance: Decimal::ZERO,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if account accepts new postings.
    pub fn can_post(&self) -> bool {
        self.enabled
    }

    /// Whether the account belongs to `(agency, subject, currency)`.
    pub fn matches_key(&self, agency_id: AgencyId, subject: &Subject, currency: &Currency) -> bool {
        self.agency_id == agency_id && &self.subject == subject && &self.currency == currency
    }
}

/// Optional filters for listing accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFilter {
    pub client_id: Option<ClientId>,
    pub operator_id: Option<OperatorId>,
    pub currency: Option<Currency>,
    pub enabled: Option<bool>,
}

impl AccountFilter {
    pub fn matches(&self, account: &CreditAccount) -> bool {
        self.client_id
            .map_or(true, |id| account.subject == Subject::Client(id))
            && self
                .operator_id
                .map_or(true, |id| account.subject == Subject::Operator(id))
            && self
                .currency
                .as_ref()
                .map_or(true, |currency| &account.currency == currency)
            && self.enabled.map_or(true, |enabled| account.enabled == enabled)
    }
}

/// Account creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAccount {
    pub client_id: Option<ClientId>,
    pub operator_id: Option<OperatorId>,
    pub currency: String,
    pub enabled: Option<bool>,
    /// Opening balance; ignored when the account already exists.
    pub initial_balance: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_is_enabled_and_empty() {
        let account = CreditAccount::new(
            AgencyId(1),
            1,
            Subject::Client(ClientId(5)),
            Currency::ars(),
        );
        assert!(account.can_post());
        assert_eq!(account.balance, Decimal::ZERO);
        assert!(account.matches_key(AgencyId(1), &Subject::Client(ClientId(5)), &Currency::ars()));
        assert!(!account.matches_key(AgencyId(1), &Subject::Client(ClientId(5)), &Currency::usd()));
    }

    #[test]
    fn test_filter() {
        let account = CreditAccount::new(
            AgencyId(1),
            1,
            Subject::Operator(OperatorId(9)),
            Currency::usd(),
        );
        assert!(AccountFilter::default().matches(&account));
        assert!(AccountFilter {
            operator_id: Some(OperatorId(9)),
            currency: Some(Currency::usd()),
            ..Default::default()
        }
        .matches(&account));
        assert!(!AccountFilter {
            client_id: Some(ClientId(9)),
            ..Default::default()
        }
        .matches(&account));
        assert!(!AccountFilter {
            enabled: Some(false),
            ..Default::default()
        }
        .matches(&account));
    }
}
