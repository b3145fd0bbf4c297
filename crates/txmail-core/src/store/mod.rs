//! Storage abstraction for txmail.
//!
//! The [`Store`] trait defines the primitive operations the ledger needs:
//! reading and replacing the singleton cursor, natural-key lookups, and a
//! uniqueness-enforcing insert. Idempotency policy lives in
//! [`crate::ledger`], not in the backends.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Cursor, TransactionCounts, TransactionRecord};

/// Result of a raw insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The insert hit a unique constraint on transaction code or message id.
    Conflict,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_cursor`](Store::get_cursor) | Read the active cursor |
/// | [`replace_cursor`](Store::replace_cursor) | Atomically replace the cursor |
/// | [`latest_transaction`](Store::latest_transaction) | Most recently processed record |
/// | [`find_transaction`](Store::find_transaction) | Lookup by code OR message id |
/// | [`insert_transaction`](Store::insert_transaction) | Insert under unique constraints |
/// | [`recent_transactions`](Store::recent_transactions) | Newest records first |
/// | [`transaction_counts`](Store::transaction_counts) | Totals for reporting |
/// | [`prune_transactions`](Store::prune_transactions) | Retention cleanup |
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_cursor(&self) -> Result<Option<Cursor>>;

    /// Replace the cursor in one atomic step. A concurrent reader sees either
    /// the old or the new record, never zero or two.
    async fn replace_cursor(&self, position: &str, items_at_update: u64) -> Result<Cursor>;

    async fn latest_transaction(&self) -> Result<Option<TransactionRecord>>;

    /// Find a record whose transaction code OR source message id matches.
    async fn find_transaction(
        &self,
        transaction_code: &str,
        message_id: &str,
    ) -> Result<Option<TransactionRecord>>;

    /// Insert a record. A unique-constraint violation is reported as
    /// [`InsertOutcome::Conflict`], not as an error.
    async fn insert_transaction(&self, record: &TransactionRecord) -> Result<InsertOutcome>;

    async fn recent_transactions(&self, limit: i64) -> Result<Vec<TransactionRecord>>;

    /// Total count, count processed at or after `since`, and last processed time.
    async fn transaction_counts(&self, since: DateTime<Utc>) -> Result<TransactionCounts>;

    /// Delete records processed before `before`. Returns how many were removed.
    async fn prune_transactions(&self, before: DateTime<Utc>) -> Result<u64>;
}
