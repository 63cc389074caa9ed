//! Ofistur Credit Ledger
//!
//! Per-agency credit accounts for clients and operators. Every account keeps a
//! running balance equal to the signed sum of its entries, where the sign of
//! an entry comes from its doc type.

pub mod account;
pub mod adjuster;
pub mod balance;
pub mod config;
pub mod doc_type;
pub mod engine;
pub mod entry;
pub mod metrics;
pub mod mutator;
pub mod poster;
pub mod resolver;
pub mod store;

pub use account::{AccountFilter, CreateAccount, CreditAccount};
pub use adjuster::{AdjustBalance, AdjustmentOutcome};
pub use config::{LedgerConfig, NegativeBalancePolicy};
pub use doc_type::DocType;
pub use engine::{AccountCreation, LedgerEngine, ReconciliationReport};
pub use entry::{CreditEntry, EntryFilter, EntryLinks, EntryPatch, PostEntry};
pub use metrics::{LedgerMetrics, MetricsSnapshot};
pub use mutator::{DeletedEntry, UpdatedEntry};
pub use poster::PostedEntry;
pub use store::{LedgerStore, LedgerTx, MemoryLedgerStore, PgLedgerStore};
