use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Open the configured database, create the schema, and close the pool.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create tables and indexes if they do not exist. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Transactions: one row per transaction code and per source message
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            receiver_account TEXT NOT NULL,
            sender_account TEXT NOT NULL,
            sender_name TEXT NOT NULL DEFAULT '',
            sender_bank TEXT NOT NULL DEFAULT '',
            transaction_type TEXT NOT NULL DEFAULT '',
            transaction_code TEXT NOT NULL UNIQUE,
            transaction_time INTEGER NOT NULL,
            transaction_time_estimated INTEGER NOT NULL DEFAULT 0,
            amount_raw TEXT NOT NULL,
            amount INTEGER NOT NULL,
            fee_raw TEXT NOT NULL DEFAULT '',
            fee INTEGER NOT NULL DEFAULT 0,
            description TEXT NOT NULL DEFAULT '',
            message_id TEXT NOT NULL UNIQUE,
            log_position TEXT NOT NULL,
            processed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Cursor: the CHECK pins the table to a single row
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_cursor (
            slot INTEGER PRIMARY KEY CHECK (slot = 1),
            position TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            items_at_update INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_time ON transactions(transaction_time DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_processed_at ON transactions(processed_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
