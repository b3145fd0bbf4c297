//! Cursor-based incremental sync against a [`Mailbox`] change log.
//!
//! The controller holds no state between invocations; the mode is derived
//! each time from the durable cursor:
//!
//! ```text
//! no cursor, no transactions ─► Bootstrapping ─► reseed from latest message
//! cursor                     ─► Steady        ─► delta since cursor
//! cursor rejected as expired ─► Recovering    ─► reseed from latest message
//! ```
//!
//! Reseeding reads only the newest matching message to learn its log
//! position and discards the content, so nothing that predates the cursor
//! is ingested. After a position expiry this permanently skips whatever
//! arrived between the old position and the reseed point.
//!
//! In steady mode the cursor advances to the log position of the last
//! message whose detail was fetched. A failed fetch followed by a
//! successful one is passed over for good. Failures at the tail of the
//! batch sit after the new cursor, so they are listed again on the next
//! cycle and skipped for good only once a later message is fetched. When
//! every fetch in the batch fails, the cursor moves to the log head and
//! those messages are not retried.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::ledger::Ledger;
use crate::mailbox::{Mailbox, MailboxError, MessageFilter};
use crate::models::{Cursor, RawMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Bootstrapping,
    Steady,
    Recovering,
}

/// A message id whose detail fetch failed. Skipped for this cycle.
#[derive(Debug)]
pub struct FetchFailure {
    pub id: String,
    pub error: MailboxError,
}

/// Output of one [`SyncController::fetch_delta`] call.
#[derive(Debug)]
pub struct SyncBatch {
    pub mode: SyncMode,
    /// Candidate messages that passed the filter, in arrival order.
    pub messages: Vec<RawMessage>,
    /// Fetched but rejected by the sender/keyword filter.
    pub filtered: usize,
    pub failures: Vec<FetchFailure>,
    next_position: Option<String>,
}

impl SyncBatch {
    /// Ids the change log reported for this batch.
    pub fn seen(&self) -> usize {
        self.messages.len() + self.filtered + self.failures.len()
    }

    /// Position and item count to save once the batch is handled, or `None`
    /// when the cursor should stay where it is.
    pub fn next_cursor(&self) -> Option<(&str, u64)> {
        let position = self.next_position.as_deref()?;
        let items = match self.mode {
            SyncMode::Steady => self.messages.len() as u64,
            SyncMode::Bootstrapping | SyncMode::Recovering => 0,
        };
        Some((position, items))
    }
}

pub struct SyncController {
    mailbox: Arc<dyn Mailbox>,
    ledger: Ledger,
    filter: MessageFilter,
}

impl SyncController {
    pub fn new(mailbox: Arc<dyn Mailbox>, ledger: Ledger, filter: MessageFilter) -> Self {
        Self {
            mailbox,
            ledger,
            filter,
        }
    }

    /// Saved cursor position, repairing it from the newest stored
    /// transaction when missing. `None` means true bootstrap.
    pub async fn resolve_start_position(&self) -> Result<Option<String>> {
        self.ledger.start_hint().await
    }

    /// Fetch everything new since `position`.
    ///
    /// An [`MailboxError::AuthExpired`] anywhere in the step triggers one
    /// credential refresh and one retry of the whole step. Any other
    /// provider error aborts the step; per-message detail failures are
    /// collected in [`SyncBatch::failures`] instead.
    pub async fn fetch_delta(&self, position: Option<&str>) -> Result<SyncBatch, MailboxError> {
        match self.fetch_once(position).await {
            Err(MailboxError::AuthExpired) => {
                tracing::info!("mailbox credentials expired; refreshing and retrying once");
                self.mailbox.refresh_auth().await?;
                self.fetch_once(position).await
            }
            other => other,
        }
    }

    /// Atomically replace the cursor.
    pub async fn advance_position(&self, position: &str, items: u64) -> Result<Cursor> {
        let cursor = self.ledger.set_cursor(position, items).await?;
        tracing::debug!(position, items, "cursor advanced");
        Ok(cursor)
    }

    async fn fetch_once(&self, position: Option<&str>) -> Result<SyncBatch, MailboxError> {
        let Some(since) = position else {
            tracing::info!("no cursor or stored transactions; bootstrapping from latest message");
            return self.reseed(SyncMode::Bootstrapping).await;
        };

        let delta = match self.mailbox.list_new_message_ids(since).await {
            Ok(delta) => delta,
            Err(MailboxError::PositionExpired(expired)) => {
                tracing::warn!(
                    expired_position = %expired,
                    "cursor expired; reseeding from latest message. Messages between the \
                     expired position and the new one are permanently skipped"
                );
                return self.reseed(SyncMode::Recovering).await;
            }
            Err(e) => return Err(e),
        };

        let mut batch = SyncBatch {
            mode: SyncMode::Steady,
            messages: Vec::new(),
            filtered: 0,
            failures: Vec::new(),
            next_position: None,
        };
        if delta.ids.is_empty() {
            return Ok(batch);
        }

        let mut last_seen = None;
        for id in &delta.ids {
            let message = match self.mailbox.get_message_detail(id).await {
                Ok(message) => message,
                Err(MailboxError::AuthExpired) => return Err(MailboxError::AuthExpired),
                Err(error) => {
                    tracing::error!(message_id = %id, error = %error, "message fetch failed; skipping");
                    batch.failures.push(FetchFailure {
                        id: id.clone(),
                        error,
                    });
                    continue;
                }
            };

            if !message.log_position.is_empty() {
                last_seen = Some(message.log_position.clone());
            }
            if self.filter.accepts(&message) {
                batch.messages.push(message);
            } else {
                tracing::debug!(message_id = %message.id, subject = %message.subject, "message filtered out");
                batch.filtered += 1;
            }
        }

        batch.next_position = last_seen.or(delta.current_position);
        Ok(batch)
    }

    /// Learn a fresh position from the latest matching message without
    /// ingesting it. Falls back to the log head when there is none.
    async fn reseed(&self, mode: SyncMode) -> Result<SyncBatch, MailboxError> {
        let from_latest = match self.mailbox.latest_message_id().await? {
            Some(id) => match self.mailbox.get_message_detail(&id).await {
                Ok(message) if !message.log_position.is_empty() => Some(message.log_position),
                Ok(_) => None,
                Err(MailboxError::NotFound(_)) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        let position = match from_latest {
            Some(position) => position,
            None => self.mailbox.current_position().await?,
        };
        tracing::info!(?mode, position = %position, "reseeded change-log position");

        Ok(SyncBatch {
            mode,
            messages: Vec::new(),
            filtered: 0,
            failures: Vec::new(),
            next_position: Some(position),
        })
    }
}
