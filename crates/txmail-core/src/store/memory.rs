//! In-memory [`Store`] implementation for tests and dry runs.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Enforces the same uniqueness
//! rules as the SQLite schema: one record per transaction code and one per
//! message id.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Cursor, TransactionCounts, TransactionRecord};

use super::{InsertOutcome, Store};

/// In-memory store.
pub struct InMemoryStore {
    cursor: RwLock<Option<Cursor>>,
    transactions: RwLock<Vec<TransactionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            cursor: RwLock::new(None),
            transactions: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored transaction records.
    pub fn len(&self) -> usize {
        self.transactions.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_cursor(&self) -> Result<Option<Cursor>> {
        Ok(self.cursor.read().map_err(poisoned)?.clone())
    }

    async fn replace_cursor(&self, position: &str, items_at_update: u64) -> Result<Cursor> {
        let cursor = Cursor {
            position: position.to_string(),
            updated_at: Utc::now(),
            items_at_update,
            active: true,
        };
        *self.cursor.write().map_err(poisoned)? = Some(cursor.clone());
        Ok(cursor)
    }

    async fn latest_transaction(&self) -> Result<Option<TransactionRecord>> {
        let txs = self.transactions.read().map_err(poisoned)?;
        // Later inserts win ties on processed_at.
        Ok(txs
            .iter()
            .enumerate()
            .max_by_key(|(i, t)| (t.processed_at, *i))
            .map(|(_, t)| t.clone()))
    }

    async fn find_transaction(
        &self,
        transaction_code: &str,
        message_id: &str,
    ) -> Result<Option<TransactionRecord>> {
        let txs = self.transactions.read().map_err(poisoned)?;
        Ok(txs
            .iter()
            .find(|t| t.transaction_code == transaction_code || t.message_id == message_id)
            .cloned())
    }

    async fn insert_transaction(&self, record: &TransactionRecord) -> Result<InsertOutcome> {
        let mut txs = self.transactions.write().map_err(poisoned)?;
        let conflict = txs.iter().any(|t| {
            t.transaction_code == record.transaction_code || t.message_id == record.message_id
        });
        if conflict {
            return Ok(InsertOutcome::Conflict);
        }
        txs.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn recent_transactions(&self, limit: i64) -> Result<Vec<TransactionRecord>> {
        let txs = self.transactions.read().map_err(poisoned)?;
        let mut ordered: Vec<(usize, &TransactionRecord)> = txs.iter().enumerate().collect();
        ordered.sort_by(|(ia, a), (ib, b)| b.processed_at.cmp(&a.processed_at).then(ib.cmp(ia)));
        Ok(ordered
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn transaction_counts(&self, since: DateTime<Utc>) -> Result<TransactionCounts> {
        let txs = self.transactions.read().map_err(poisoned)?;
        Ok(TransactionCounts {
            total: txs.len() as i64,
            since: txs.iter().filter(|t| t.processed_at >= since).count() as i64,
            last_processed_at: txs.iter().map(|t| t.processed_at).max(),
        })
    }

    async fn prune_transactions(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut txs = self.transactions.write().map_err(poisoned)?;
        let start = txs.len();
        txs.retain(|t| t.processed_at >= before);
        Ok((start - txs.len()) as u64)
    }
}
