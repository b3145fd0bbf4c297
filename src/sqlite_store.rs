//! SQLite-backed [`Store`] implementation.
//!
//! Timestamps are stored as Unix milliseconds. Transaction times are
//! rebuilt in the sender's UTC+7 offset on read, which is how they were
//! produced in the first place.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use txmail_core::models::{Cursor, TransactionCounts, TransactionRecord, SENDER_OFFSET};
use txmail_core::store::{InsertOutcome, Store};

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`Store`] trait over the `transactions`
/// and `sync_cursor` tables created by [`crate::migrate::apply`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const TRANSACTION_COLUMNS: &str = "id, receiver_account, sender_account, sender_name, \
    sender_bank, transaction_type, transaction_code, transaction_time, \
    transaction_time_estimated, amount_raw, amount, fee_raw, fee, description, \
    message_id, log_position, processed_at";

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("timestamp out of range: {}", ms))
}

fn row_to_record(row: &SqliteRow) -> Result<TransactionRecord> {
    let transaction_time: i64 = row.try_get("transaction_time")?;
    let processed_at: i64 = row.try_get("processed_at")?;
    let estimated: i64 = row.try_get("transaction_time_estimated")?;

    Ok(TransactionRecord {
        id: row.try_get("id")?,
        receiver_account: row.try_get("receiver_account")?,
        sender_account: row.try_get("sender_account")?,
        sender_name: row.try_get("sender_name")?,
        sender_bank: row.try_get("sender_bank")?,
        transaction_type: row.try_get("transaction_type")?,
        transaction_code: row.try_get("transaction_code")?,
        transaction_time: from_millis(transaction_time)?.with_timezone(&SENDER_OFFSET),
        transaction_time_estimated: estimated != 0,
        amount_raw: row.try_get("amount_raw")?,
        amount: row.try_get("amount")?,
        fee_raw: row.try_get("fee_raw")?,
        fee: row.try_get("fee")?,
        description: row.try_get("description")?,
        message_id: row.try_get("message_id")?,
        log_position: row.try_get("log_position")?,
        processed_at: from_millis(processed_at)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_cursor(&self) -> Result<Option<Cursor>> {
        let row = sqlx::query(
            "SELECT position, updated_at, items_at_update, active FROM sync_cursor WHERE slot = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let updated_at: i64 = row.try_get("updated_at")?;
        let items: i64 = row.try_get("items_at_update")?;
        let active: i64 = row.try_get("active")?;

        Ok(Some(Cursor {
            position: row.try_get("position")?,
            updated_at: from_millis(updated_at)?,
            items_at_update: items.max(0) as u64,
            active: active != 0,
        }))
    }

    async fn replace_cursor(&self, position: &str, items_at_update: u64) -> Result<Cursor> {
        let now = Utc::now();

        // Single-statement upsert on the fixed slot: readers see old or new, never both.
        sqlx::query(
            r#"
            INSERT INTO sync_cursor (slot, position, updated_at, items_at_update, active)
            VALUES (1, ?, ?, ?, 1)
            ON CONFLICT(slot) DO UPDATE SET
                position = excluded.position,
                updated_at = excluded.updated_at,
                items_at_update = excluded.items_at_update,
                active = 1
            "#,
        )
        .bind(position)
        .bind(now.timestamp_millis())
        .bind(items_at_update as i64)
        .execute(&self.pool)
        .await?;

        Ok(Cursor {
            position: position.to_string(),
            updated_at: now,
            items_at_update,
            active: true,
        })
    }

    async fn latest_transaction(&self) -> Result<Option<TransactionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions ORDER BY processed_at DESC, rowid DESC LIMIT 1",
            TRANSACTION_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn find_transaction(
        &self,
        transaction_code: &str,
        message_id: &str,
    ) -> Result<Option<TransactionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE transaction_code = ? OR message_id = ? LIMIT 1",
            TRANSACTION_COLUMNS
        ))
        .bind(transaction_code)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn insert_transaction(&self, record: &TransactionRecord) -> Result<InsertOutcome> {
        let result = sqlx::query(&format!(
            "INSERT INTO transactions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            TRANSACTION_COLUMNS
        ))
        .bind(&record.id)
        .bind(&record.receiver_account)
        .bind(&record.sender_account)
        .bind(&record.sender_name)
        .bind(&record.sender_bank)
        .bind(&record.transaction_type)
        .bind(&record.transaction_code)
        .bind(record.transaction_time.timestamp_millis())
        .bind(record.transaction_time_estimated as i64)
        .bind(&record.amount_raw)
        .bind(record.amount)
        .bind(&record.fee_raw)
        .bind(record.fee)
        .bind(&record.description)
        .bind(&record.message_id)
        .bind(&record.log_position)
        .bind(record.processed_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Conflict),
            Err(e) => Err(e).context("Failed to insert transaction"),
        }
    }

    async fn recent_transactions(&self, limit: i64) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions ORDER BY processed_at DESC, rowid DESC LIMIT ?",
            TRANSACTION_COLUMNS
        ))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn transaction_counts(&self, since: DateTime<Utc>) -> Result<TransactionCounts> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN processed_at >= ? THEN 1 ELSE 0 END), 0) AS since,
                   MAX(processed_at) AS last_processed_at
            FROM transactions
            "#,
        )
        .bind(since.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        let last: Option<i64> = row.try_get("last_processed_at")?;
        Ok(TransactionCounts {
            total: row.try_get("total")?,
            since: row.try_get("since")?,
            last_processed_at: last.map(from_millis).transpose()?,
        })
    }

    async fn prune_transactions(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM transactions WHERE processed_at < ?")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
