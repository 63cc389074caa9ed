//! Ofistur Ledger Server
//!
//! JSON-over-HTTP front end for the credit ledger.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{ServerConfig, StorageBackend};
pub use routes::router;
pub use state::AppState;
