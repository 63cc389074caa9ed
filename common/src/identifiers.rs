//! Identifier types for ledger entities and the back-office records they reference.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{LedgerError, Result};

/// Unique identifier for a credit account.
/// Uses UUID v7 for time-ordered identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Create a new account ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string.
    pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a credit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new entry ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string.
    pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer keys owned by the surrounding back-office (agencies, clients, bookings...).
macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the raw key.
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

record_id!(
    /// Travel agency (tenant) identifier.
    AgencyId
);
record_id!(
    /// Client identifier.
    ClientId
);
record_id!(
    /// Operator (supplier) identifier.
    OperatorId
);
record_id!(
    /// Back-office user identifier.
    UserId
);
record_id!(BookingId);
record_id!(ReceiptId);
record_id!(InvestmentId);
record_id!(OperatorDueId);

/// Who a credit account tracks a balance against. Exactly one per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Subject {
    Client(ClientId),
    Operator(OperatorId),
}

impl Subject {
    /// Build a subject from the optional client/operator pair callers send.
    pub fn from_parts(client_id: Option<ClientId>, operator_id: Option<OperatorId>) -> Result<Self> {
        match (client_id, operator_id) {
            (Some(client), None) => Ok(Subject::Client(client)),
            (None, Some(operator)) => Ok(Subject::Operator(operator)),
            _ => Err(LedgerError::validation(
                "must specify exactly one subject (client_id or operator_id)",
                "subject",
            )),
        }
    }

    pub fn client_id(&self) -> Option<ClientId> {
        match self {
            Subject::Client(id) => Some(*id),
            Subject::Operator(_) => None,
        }
    }

    pub fn operator_id(&self) -> Option<OperatorId> {
        match self {
            Subject::Operator(id) => Some(*id),
            Subject::Client(_) => None,
        }
    }

    pub fn is_client(&self) -> bool {
        matches!(self, Subject::Client(_))
    }

    /// Canonical key, stable across processes.
    pub fn canonical(&self) -> String {
        match self {
            Subject::Client(id) => format!("client:{}", id),
            Subject::Operator(id) => format!("operator:{}", id),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_creation() {
        let id1 = AccountId::new();
        let id2 = AccountId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_entry_id_parse() {
        let uuid_str = "019456ab-1234-7def-8901-234567890abc";
        let id = EntryId::parse(uuid_str).unwrap();
        assert_eq!(id.to_string(), uuid_str);
    }

    #[test]
    fn test_subject_requires_exactly_one() {
        assert_eq!(
            Subject::from_parts(Some(ClientId(7)), None).unwrap(),
            Subject::Client(ClientId(7))
        );
        assert_eq!(
            Subject::from_parts(None, Some(OperatorId(3))).unwrap(),
            Subject::Operator(OperatorId(3))
        );

        let both = Subject::from_parts(Some(ClientId(7)), Some(OperatorId(3))).unwrap_err();
        assert_eq!(both.error_code(), "VALIDATION_FAILED");
        assert!(Subject::from_parts(None, None).is_err());
    }

    #[test]
    fn test_subject_wire_format() {
        let json = serde_json::to_string(&Subject::Operator(OperatorId(42))).unwrap();
        assert_eq!(json, r#"{"type":"operator","id":42}"#);
        assert_eq!(Subject::Client(ClientId(9)).canonical(), "client:9");
    }
}
