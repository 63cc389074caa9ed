//! Server configuration.

use std::net::SocketAddr;
use std::str::FromStr;

use ofistur_common::{AgencyId, ClientId, OperatorId, Subject};
use ofistur_ledger::{LedgerConfig, NegativeBalancePolicy};

/// Where ledger data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process memory; data is lost on restart.
    Memory,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Postgres => "postgres",
            StorageBackend::Memory => "memory",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Main server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Database URL.
    pub database_url: String,
    pub storage_backend: StorageBackend,
    /// Maximum pooled database connections.
    pub db_max_connections: u32,
    /// Log level used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Subjects known to the memory backend, as `(agency, subject)` pairs.
    pub memory_subjects: Vec<(AgencyId, Subject)>,
    /// Ledger behaviour.
    pub ledger: LedgerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            database_url: "postgres://localhost/ofistur".to_string(),
            storage_backend: StorageBackend::Postgres,
            db_max_connections: 10,
            log_level: "info".to_string(),
            memory_subjects: Vec::new(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = lookup("LISTEN_PORT") {
            config.listen_port = port
                .parse()
                .map_err(|_| format!("LISTEN_PORT '{}' is not a port number", port))?;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }

        if let Some(backend) = lookup("STORAGE_BACKEND") {
            config.storage_backend = backend.parse()?;
        }

        if let Some(max) = lookup("DB_MAX_CONNECTIONS") {
            config.db_max_connections = max
                .parse()
                .map_err(|_| format!("DB_MAX_CONNECTIONS '{}' is not a number", max))?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(subjects) = lookup("MEMORY_SUBJECTS") {
            config.memory_subjects = parse_subjects(&subjects)?;
        }

        if let Some(policy) = lookup("LEDGER_NEGATIVE_BALANCE_POLICY") {
            config.ledger.negative_balance_policy = policy.parse::<NegativeBalancePolicy>()?;
        }

        if let Some(strict) = lookup("LEDGER_STRICT_DOC_TYPES") {
            config.ledger.strict_doc_types = strict
                .trim()
                .parse()
                .map_err(|_| format!("LEDGER_STRICT_DOC_TYPES '{}' is not a boolean", strict))?;
        }

        if let Some(reference) = lookup("LEDGER_ADJUSTMENT_REFERENCE") {
            config.ledger.adjustment_reference = reference;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        if self.storage_backend == StorageBackend::Postgres {
            if self.database_url.is_empty() {
                return Err("Database URL cannot be empty".to_string());
            }
            if self.db_max_connections == 0 {
                return Err("Database pool needs at least one connection".to_string());
            }
        }

        self.listen_socket()?;
        self.ledger.validate()
    }

    pub fn listen_socket(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.listen_addr, self.listen_port)
            .parse()
            .map_err(|_| format!("invalid listen address '{}'", self.listen_addr))
    }
}

/// Parse `agency:client:id` / `agency:operator:id` items separated by commas.
fn parse_subjects(raw: &str) -> Result<Vec<(AgencyId, Subject)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let invalid = || format!("invalid subject '{}', expected agency:client|operator:id", item);
            let mut parts = item.split(':');
            let (Some(agency), Some(kind), Some(id), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(invalid());
            };
            let agency = AgencyId(agency.parse().map_err(|_| invalid())?);
            let id: i64 = id.parse().map_err(|_| invalid())?;
            let subject = match kind {
                "client" => Subject::Client(ClientId(id)),
                "operator" => Subject::Operator(OperatorId(id)),
                _ => return Err(invalid()),
            };
            Ok((agency, subject))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_socket().unwrap().port(), 8080);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = ServerConfig::default();
        config.listen_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("LISTEN_PORT", "9000"),
            ("STORAGE_BACKEND", "memory"),
            ("LEDGER_NEGATIVE_BALANCE_POLICY", "reject_clients"),
            ("LEDGER_STRICT_DOC_TYPES", "false"),
            ("MEMORY_SUBJECTS", "1:client:10, 1:operator:20"),
        ]))
        .unwrap();

        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(
            config.ledger.negative_balance_policy,
            NegativeBalancePolicy::RejectForClients
        );
        assert!(!config.ledger.strict_doc_types);
        assert_eq!(
            config.memory_subjects,
            vec![
                (AgencyId(1), Subject::Client(ClientId(10))),
                (AgencyId(1), Subject::Operator(OperatorId(20))),
            ]
        );
    }

    #[test]
    fn test_bad_values_are_reported() {
        assert!(ServerConfig::from_lookup(lookup(&[("LISTEN_PORT", "http")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("STORAGE_BACKEND", "redis")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("MEMORY_SUBJECTS", "1:agent:3")])).is_err());
    }
}
