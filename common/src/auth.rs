//! Caller identity handed to every ledger operation.
//!
//! Token parsing happens upstream; the ledger only trusts the resolved
//! `(actor, agency, role)` triple it is given.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LedgerError, Result};
use crate::{AgencyId, UserId};

/// Back-office roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "desarrollador")]
    Developer,
    #[serde(rename = "gerente")]
    Manager,
    #[serde(rename = "administrativo")]
    Administrative,
    #[serde(rename = "vendedor")]
    Seller,
    #[serde(rename = "lider")]
    TeamLead,
    #[serde(rename = "marketing")]
    Marketing,
}

impl Role {
    /// Wire tag of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Developer => "desarrollador",
            Role::Manager => "gerente",
            Role::Administrative => "administrativo",
            Role::Seller => "vendedor",
            Role::TeamLead => "lider",
            Role::Marketing => "marketing",
        }
    }

    /// Whether the role may read or post ledger movements at all.
    pub fn can_access_ledger(&self) -> bool {
        !matches!(self, Role::Marketing)
    }

    /// Admin tier: may edit, delete, adjust and toggle accounts.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Developer | Role::Manager | Role::Administrative)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "desarrollador" => Ok(Role::Developer),
            "gerente" => Ok(Role::Manager),
            "administrativo" => Ok(Role::Administrative),
            "vendedor" => Ok(Role::Seller),
            "lider" => Ok(Role::TeamLead),
            "marketing" => Ok(Role::Marketing),
            other => Err(LedgerError::Unauthenticated(format!("unknown role '{}'", other))),
        }
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub actor_id: UserId,
    pub agency_id: AgencyId,
    pub role: Role,
}

impl AuthContext {
    pub fn new(actor_id: UserId, agency_id: AgencyId, role: Role) -> Self {
        Self {
            actor_id,
            agency_id,
            role,
        }
    }

    /// Reject callers whose role has no ledger access.
    pub fn require_ledger_access(&self) -> Result<()> {
        if self.role.can_access_ledger() {
            Ok(())
        } else {
            Err(LedgerError::forbidden(format!(
                "role '{}' has no access to the credit ledger",
                self.role
            )))
        }
    }

    /// Reject callers outside the admin tier.
    pub fn require_admin(&self) -> Result<()> {
        self.require_ledger_access()?;
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(LedgerError::forbidden(format!(
                "role '{}' cannot perform administrative ledger changes",
                self.role
            )))
        }
    }

    /// Reject references to records owned by another agency.
    pub fn ensure_agency(&self, owner: AgencyId, what: &str) -> Result<()> {
        if owner == self.agency_id {
            Ok(())
        } else {
            Err(LedgerError::forbidden(format!(
                "{} does not belong to agency {}",
                what, self.agency_id
            )))
        }
    }
}
