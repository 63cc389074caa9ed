//! Ledger policy configuration.

use std::str::FromStr;

/// What to do with postings that leave a client balance below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegativeBalancePolicy {
    /// Balances may go negative for any posting.
    #[default]
    Allow,
    /// Postings and reclassifications that leave a client account below zero
    /// are refused unless the entry is an adjustment. Operator accounts are
    /// never restricted.
    RejectForClients,
}

impl FromStr for NegativeBalancePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(NegativeBalancePolicy::Allow),
            "reject_clients" | "reject_for_clients" => Ok(NegativeBalancePolicy::RejectForClients),
            other => Err(format!("unknown negative balance policy '{}'", other)),
        }
    }
}

/// Ledger behaviour toggles.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Negative balance rule for client accounts.
    pub negative_balance_policy: NegativeBalancePolicy,
    /// Refuse doc types outside the documented set on posting and reclassification.
    pub strict_doc_types: bool,
    /// Reference stamped on adjustment entries when the caller gives none.
    pub adjustment_reference: String,
    /// Prefix of the concept of manual balance adjustments.
    pub adjustment_concept_prefix: String,
    /// Concept of the entry recording an account's opening balance.
    pub opening_balance_concept: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            negative_balance_policy: NegativeBalancePolicy::Allow,
            strict_doc_types: true,
            adjustment_reference: "AJUSTE_SALDO".to_string(),
            adjustment_concept_prefix: "Ajuste manual: ".to_string(),
            opening_balance_concept: "Saldo inicial".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.adjustment_reference.trim().is_empty() {
            return Err("Adjustment reference cannot be empty".to_string());
        }

        if self.opening_balance_concept.trim().is_empty() {
            return Err("Opening balance concept cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.negative_balance_policy, NegativeBalancePolicy::Allow);
        assert!(config.strict_doc_types);
    }

    #[test]
    fn test_invalid_config() {
        let config = LedgerConfig {
            adjustment_reference: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "reject_clients".parse::<NegativeBalancePolicy>().unwrap(),
            NegativeBalancePolicy::RejectForClients
        );
        assert_eq!("ALLOW".parse::<NegativeBalancePolicy>().unwrap(), NegativeBalancePolicy::Allow);
        assert!("sometimes".parse::<NegativeBalancePolicy>().is_err());
    }
}
