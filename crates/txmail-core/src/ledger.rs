//! Idempotent persistence on top of a [`Store`].
//!
//! The ledger owns the at-most-once policy: a record is written only when
//! neither its transaction code nor its source message id is already known,
//! and a uniqueness rejection from the backend (two writers racing on the
//! same record) is folded into a successful dedup. It also owns cursor
//! read/repair/replace.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{Cursor, TransactionCounts, TransactionRecord};
use crate::store::{InsertOutcome, Store};

/// What [`Ledger::store`] did with a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Newly written.
    Created(TransactionRecord),
    /// A record with the same code or message id already existed; nothing
    /// was written.
    Existing(TransactionRecord),
    /// The lookup missed but the insert lost a uniqueness race.
    RaceDeduplicated,
}

impl StoreOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, StoreOutcome::Created(_))
    }
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Persist `record` at most once per transaction code and message id.
    pub async fn store(&self, record: TransactionRecord) -> Result<StoreOutcome> {
        if let Some(existing) = self
            .store
            .find_transaction(&record.transaction_code, &record.message_id)
            .await?
        {
            tracing::info!(
                code = %record.transaction_code,
                message_id = %record.message_id,
                existing_id = %existing.id,
                "transaction already stored"
            );
            return Ok(StoreOutcome::Existing(existing));
        }

        match self.store.insert_transaction(&record).await? {
            InsertOutcome::Inserted => Ok(StoreOutcome::Created(record)),
            InsertOutcome::Conflict => {
                tracing::warn!(
                    code = %record.transaction_code,
                    message_id = %record.message_id,
                    "insert lost a uniqueness race; treating as duplicate"
                );
                Ok(StoreOutcome::RaceDeduplicated)
            }
        }
    }

    pub async fn cursor(&self) -> Result<Option<Cursor>> {
        self.store.get_cursor().await
    }

    /// Starting position for the next delta fetch.
    ///
    /// Prefers the saved cursor. Without one, repairs the cursor from the
    /// newest stored transaction's log position (a previous cycle may have
    /// stored records and then died before saving the cursor). `None` only
    /// when both are empty.
    pub async fn start_hint(&self) -> Result<Option<String>> {
        if let Some(cursor) = self.store.get_cursor().await? {
            if !cursor.position.is_empty() {
                return Ok(Some(cursor.position));
            }
        }

        let Some(latest) = self.store.latest_transaction().await? else {
            return Ok(None);
        };
        if latest.log_position.is_empty() {
            return Ok(None);
        }

        tracing::info!(
            position = %latest.log_position,
            code = %latest.transaction_code,
            "cursor missing; repairing from latest stored transaction"
        );
        let cursor = self.store.replace_cursor(&latest.log_position, 0).await?;
        Ok(Some(cursor.position))
    }

    /// Atomically replace the cursor.
    pub async fn set_cursor(&self, position: &str, items_at_update: u64) -> Result<Cursor> {
        self.store.replace_cursor(position, items_at_update).await
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<TransactionRecord>> {
        self.store.recent_transactions(limit).await
    }

    pub async fn counts(&self, since: DateTime<Utc>) -> Result<TransactionCounts> {
        self.store.transaction_counts(since).await
    }

    /// Delete records processed before `before`. The cursor is untouched.
    pub async fn prune(&self, before: DateTime<Utc>) -> Result<u64> {
        let removed = self.store.prune_transactions(before).await?;
        tracing::info!(removed, cutoff = %before, "pruned old transactions");
        Ok(removed)
    }
}
