//! Shared handler state.

use std::time::Instant;

use ofistur_ledger::LedgerEngine;

use crate::config::StorageBackend;

#[derive(Clone)]
pub struct AppState {
    pub engine: LedgerEngine,
    pub backend: StorageBackend,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: LedgerEngine, backend: StorageBackend) -> Self {
        Self {
            engine,
            backend,
            started_at: Instant::now(),
        }
    }
}
