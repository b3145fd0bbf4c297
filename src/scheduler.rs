//! Background tasks for `txmail serve`: the ingestion timer, daily
//! retention cleanup, and the optional keep-alive ping.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::ingest::{CycleError, Orchestrator};
use crate::retention;

const RETENTION_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Run one ingestion cycle per tick. Ticks that land while a cycle (timer
/// or manual) is still running are dropped, not queued.
pub fn spawn_ingestion(orchestrator: Arc<Orchestrator>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match orchestrator.run_ingestion_cycle().await {
                Ok(_) => {}
                Err(CycleError::AlreadyProcessing) => {
                    tracing::debug!("previous cycle still running; skipping tick");
                }
                // Already logged by the orchestrator; the next tick retries.
                Err(CycleError::Aborted(_)) => {}
            }
        }
    })
}

/// Prune transactions older than `days`, once at start-up and then daily.
pub fn spawn_retention(orchestrator: Arc<Orchestrator>, days: i64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(RETENTION_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = retention::prune_older_than(orchestrator.ledger(), days).await {
                tracing::warn!(error = %format!("{:#}", e), "retention cleanup failed");
            }
        }
    })
}

/// Periodically GET `/health` on the local server so hosting platforms that
/// idle quiet services keep this one awake.
pub fn spawn_keep_alive(health_url: String, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; the server is not listening yet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match client.get(&health_url).send().await {
                Ok(resp) => tracing::debug!(status = %resp.status(), "keep-alive ping"),
                Err(e) => tracing::debug!(error = %e, "keep-alive ping failed"),
            }
        }
    })
}

/// URL for the server's own `/health`, reachable from this process.
pub fn local_health_url(bind: &str) -> String {
    let target = match bind.rsplit_once(':') {
        Some(("0.0.0.0", port)) | Some(("[::]", port)) => format!("127.0.0.1:{}", port),
        _ => bind.to_string(),
    };
    format!("http://{}/health", target)
}
