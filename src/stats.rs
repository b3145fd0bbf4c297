//! Store statistics and recent-transaction listings.
//!
//! Backs `GET /stats` and the `txmail stats` / `txmail recent` commands.
//! "Today" is the sender's calendar day, starting at 00:00 UTC+7.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;

use txmail_core::ledger::Ledger;
use txmail_core::models::{Cursor, SENDER_OFFSET};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub total: i64,
    pub today: i64,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub cursor: Option<Cursor>,
}

/// Midnight of `now`'s calendar day in UTC+7, as a UTC instant.
pub fn start_of_sender_day(now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&SENDER_OFFSET).date_naive();
    let midnight = local.and_hms_opt(0, 0, 0).unwrap_or_default();
    SENDER_OFFSET
        .from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

pub async fn store_summary(ledger: &Ledger) -> Result<StoreSummary> {
    let counts = ledger.counts(start_of_sender_day(Utc::now())).await?;
    Ok(StoreSummary {
        total: counts.total,
        today: counts.since,
        last_processed_at: counts.last_processed_at,
        cursor: ledger.cursor().await?,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let pool = store.pool().clone();
    let ledger = Ledger::new(Arc::new(store));
    let summary = store_summary(&ledger).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("txmail: Database Stats");
    println!("======================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Transactions:  {}", summary.total);
    println!("  Today (UTC+7): {}", summary.today);
    println!(
        "  Last stored:   {}",
        summary
            .last_processed_at
            .map(format_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    match &summary.cursor {
        Some(cursor) => println!(
            "  Cursor:        {} ({} items, {})",
            cursor.position,
            cursor.items_at_update,
            format_relative(cursor.updated_at)
        ),
        None => println!("  Cursor:        none (next sync bootstraps)"),
    }
    println!();

    pool.close().await;
    Ok(())
}

/// Print the newest stored transactions.
pub async fn run_recent(config: &Config, limit: i64) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let pool = store.pool().clone();
    let records = Ledger::new(Arc::new(store)).recent(limit).await?;

    if records.is_empty() {
        println!("No transactions stored.");
    } else {
        println!(
            "  {:<20} {:>14}  {:<16} {:<24} {}",
            "TIME (UTC+7)", "AMOUNT", "CODE", "SENDER", "DESCRIPTION"
        );
        println!("  {}", "-".repeat(96));
        for r in &records {
            println!(
                "  {:<20} {:>14}  {:<16} {:<24} {}{}",
                r.transaction_time.format("%Y-%m-%d %H:%M:%S"),
                format_amount(r.amount),
                r.transaction_code,
                r.sender_name,
                r.description,
                if r.transaction_time_estimated { "  (time estimated)" } else { "" }
            );
        }
    }

    pool.close().await;
    Ok(())
}

/// Group thousands with `.` the way the sender writes amounts.
fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    if amount < 0 {
        format!("-{} VND", out)
    } else {
        format!("{} VND", out)
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a timestamp relative to now (e.g. "3 hours ago").
fn format_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        ts.format("%Y-%m-%d %H:%M").to_string()
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
