//! Ingestion cycle orchestration.
//!
//! One cycle runs: resolve start position → fetch delta → assemble each
//! candidate → persist accepted records → advance the cursor. Cycles are
//! single-flight: a one-permit semaphore is acquired without waiting, so a
//! trigger that arrives mid-cycle is rejected instead of queued.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};

use txmail_core::assemble::{Assembler, Assembly};
use txmail_core::ledger::{Ledger, StoreOutcome};
use txmail_core::mailbox::{Mailbox, MessageFilter};
use txmail_core::models::{Cursor, TransactionRecord};
use txmail_core::store::Store;
use txmail_core::sync::{SyncController, SyncMode};

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("an ingestion cycle is already processing")]
    AlreadyProcessing,
    /// Provider or store failure before the batch completed. The cursor was
    /// not moved, so the next cycle retries from the same position.
    #[error("ingestion cycle aborted: {0}")]
    Aborted(String),
}

/// Outcome counts for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub mode: SyncMode,
    /// Message ids reported by the change log.
    pub processed: usize,
    /// Newly stored records.
    pub succeeded: usize,
    /// Already stored, by lookup or by losing a uniqueness race.
    pub duplicates: usize,
    /// Filtered out or missing required fields.
    pub skipped: usize,
    /// Outgoing transfers.
    pub excluded: usize,
    /// Detail fetch or persistence failures.
    pub failed: usize,
    pub cursor_advanced: bool,
    pub duration_ms: u64,
}

impl CycleReport {
    fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            processed: 0,
            succeeded: 0,
            duplicates: 0,
            skipped: 0,
            excluded: 0,
            failed: 0,
            cursor_advanced: false,
            duration_ms: 0,
        }
    }
}

/// Aggregate statistics since process start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total_processed: u64,
    pub success_count: u64,
    pub skipped_count: u64,
    pub excluded_count: u64,
    pub error_count: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_process_time: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
}

impl RunStats {
    fn record(&mut self, report: &CycleReport) {
        self.total_processed += report.processed as u64;
        self.success_count += report.succeeded as u64;
        self.skipped_count += report.skipped as u64;
        self.excluded_count += report.excluded as u64;
        self.error_count += report.failed as u64;
        self.cycles_completed += 1;
    }
}

pub struct Orchestrator {
    controller: SyncController,
    ledger: Ledger,
    assembler: Assembler,
    permit: Semaphore,
    stats: Mutex<RunStats>,
}

impl Orchestrator {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        store: Arc<dyn Store>,
        filter: MessageFilter,
        assembler: Assembler,
    ) -> Self {
        let ledger = Ledger::new(store);
        Self {
            controller: SyncController::new(mailbox, ledger.clone(), filter),
            ledger,
            assembler,
            permit: Semaphore::new(1),
            stats: Mutex::new(RunStats::default()),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn is_processing(&self) -> bool {
        self.permit.available_permits() == 0
    }

    pub async fn stats(&self) -> RunStats {
        self.stats.lock().await.clone()
    }

    pub async fn cursor(&self) -> Result<Option<Cursor>> {
        self.ledger.cursor().await
    }

    /// Run one cycle, or return [`CycleError::AlreadyProcessing`] at once
    /// if another is in flight.
    pub async fn run_ingestion_cycle(&self) -> Result<CycleReport, CycleError> {
        // Released on every exit path when the guard drops.
        let _permit = self
            .permit
            .try_acquire()
            .map_err(|_| CycleError::AlreadyProcessing)?;

        let started = Instant::now();
        let result = self.run_cycle().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut stats = self.stats.lock().await;
        stats.last_process_time = Some(Utc::now());
        stats.last_duration_ms = Some(duration_ms);

        match result {
            Ok(mut report) => {
                report.duration_ms = duration_ms;
                stats.record(&report);
                tracing::info!(
                    mode = ?report.mode,
                    processed = report.processed,
                    succeeded = report.succeeded,
                    duplicates = report.duplicates,
                    skipped = report.skipped,
                    excluded = report.excluded,
                    failed = report.failed,
                    cursor_advanced = report.cursor_advanced,
                    duration_ms,
                    "ingestion cycle complete"
                );
                Ok(report)
            }
            Err(e) => {
                stats.cycles_failed += 1;
                tracing::error!(error = %format!("{:#}", e), duration_ms, "ingestion cycle aborted");
                Err(CycleError::Aborted(format!("{:#}", e)))
            }
        }
    }

    async fn run_cycle(&self) -> Result<CycleReport> {
        let start = self.controller.resolve_start_position().await?;
        let batch = self.controller.fetch_delta(start.as_deref()).await?;

        let mut report = CycleReport::new(batch.mode);
        report.processed = batch.seen();
        report.skipped = batch.filtered;
        report.failed = batch.failures.len();

        // Sequential, in change-log order.
        for message in &batch.messages {
            match self.assembler.assemble(&message.body_markup) {
                Assembly::Incomplete { missing } => {
                    let missing: Vec<&str> = missing.iter().map(|f| f.key()).collect();
                    tracing::debug!(message_id = %message.id, ?missing, "not a transaction notification");
                    report.skipped += 1;
                }
                Assembly::Outgoing(tx) => {
                    tracing::info!(
                        message_id = %message.id,
                        code = %tx.transaction_code,
                        amount = tx.amount,
                        "outgoing transfer excluded"
                    );
                    report.excluded += 1;
                }
                Assembly::Accepted(tx) => {
                    let record = TransactionRecord::from_parsed(tx, message);
                    match self.ledger.store(record).await {
                        Ok(StoreOutcome::Created(record)) => {
                            tracing::info!(
                                code = %record.transaction_code,
                                amount = record.amount,
                                sender = %record.sender_name,
                                estimated_time = record.transaction_time_estimated,
                                "transaction stored"
                            );
                            report.succeeded += 1;
                        }
                        Ok(StoreOutcome::Existing(_)) | Ok(StoreOutcome::RaceDeduplicated) => {
                            report.duplicates += 1;
                        }
                        Err(e) => {
                            tracing::error!(
                                message_id = %message.id,
                                error = %format!("{:#}", e),
                                "failed to persist transaction"
                            );
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        if let Some((position, items)) = batch.next_cursor() {
            self.controller.advance_position(position, items).await?;
            report.cursor_advanced = true;
        }

        Ok(report)
    }
}
