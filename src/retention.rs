//! Retention cleanup for stored transactions.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use txmail_core::ledger::Ledger;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Upper bound for a retention window, in days (100 years).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

pub fn cutoff(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    let window = Duration::try_days(days)
        .with_context(|| format!("retention window of {} days is out of range", days))?;
    now.checked_sub_signed(window)
        .with_context(|| format!("retention cutoff {} days before {} is out of range", days, now))
}

/// Delete transactions processed more than `days` ago. The cursor is kept.
pub async fn prune_older_than(ledger: &Ledger, days: i64) -> Result<u64> {
    ledger.prune(cutoff(Utc::now(), days)?).await
}

pub async fn run_prune(config: &Config, days: Option<i64>) -> Result<()> {
    let days = days.unwrap_or(config.retention.days);
    if days <= 0 {
        anyhow::bail!("--days must be > 0");
    }
    if days > MAX_RETENTION_DAYS {
        anyhow::bail!("--days must be <= {}", MAX_RETENTION_DAYS);
    }

    let store = SqliteStore::open(config).await?;
    let pool = store.pool().clone();
    let removed = prune_older_than(&Ledger::new(Arc::new(store)), days).await?;
    println!("Pruned {} transaction(s) older than {} day(s).", removed, days);

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cutoff_subtracts_days() {
        let now = Utc.with_ymd_and_hms(2025, 8, 31, 12, 0, 0).unwrap();
        assert_eq!(
            cutoff(now, 30).unwrap(),
            Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_cutoff_out_of_range_is_an_error() {
        assert!(cutoff(Utc::now(), 200_000_000).is_err());
        assert!(cutoff(Utc::now(), i64::MAX).is_err());
        assert!(cutoff(Utc::now(), MAX_RETENTION_DAYS).is_ok());
    }
}
