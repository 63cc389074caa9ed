//! Ledger activity counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Ledger metrics.
#[derive(Debug, Default)]
pub struct LedgerMetrics {
    /// Accounts created (explicitly or on first posting).
    pub accounts_created: AtomicU64,
    /// Entries posted through the entry poster.
    pub entries_posted: AtomicU64,
    /// Entry edits (any field).
    pub entries_edited: AtomicU64,
    /// Edits whose doc type change flipped the entry's sign.
    pub entries_reclassified: AtomicU64,
    /// Entries deleted.
    pub entries_deleted: AtomicU64,
    /// Balance adjustments that created an entry.
    pub adjustments_applied: AtomicU64,
    /// Balance adjustments that were no-ops.
    pub adjustments_skipped: AtomicU64,
    /// Operations refused with a conflict.
    pub conflicts: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub accounts_created: u64,
    pub entries_posted: u64,
    pub entries_edited: u64,
    pub entries_reclassified: u64,
    pub entries_deleted: u64,
    pub adjustments_applied: u64,
    pub adjustments_skipped: u64,
    pub conflicts: u64,
}

impl LedgerMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_created(&self) {
        self.accounts_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entry_posted(&self) {
        self.entries_posted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entry_edited(&self, reclassified: bool) {
        self.entries_edited.fetch_add(1, Ordering::Relaxed);
        if reclassified {
            self.entries_reclassified.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn entry_deleted(&self) {
        self.entries_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn adjustment(&self, changed: bool) {
        if changed {
            self.adjustments_applied.fetch_add(1, Ordering::Relaxed);
        } else {
            self.adjustments_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accounts_created: self.accounts_created.load(Ordering::Relaxed),
            entries_posted: self.entries_posted.load(Ordering::Relaxed),
            entries_edited: self.entries_edited.load(Ordering::Relaxed),
            entries_reclassified: self.entries_reclassified.load(Ordering::Relaxed),
            entries_deleted: self.entries_deleted.load(Ordering::Relaxed),
            adjustments_applied: self.adjustments_applied.load(Ordering::Relaxed),
            adjustments_skipped: self.adjustments_skipped.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}
