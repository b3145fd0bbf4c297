//! Core data models used throughout txmail.
//!
//! These types represent the messages, cursor, and transaction records that
//! flow through the sync → extract → persist pipeline.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

/// The sender's operating timezone. Transaction timestamps are always
/// interpreted in UTC+7 regardless of where the process runs.
pub const SENDER_OFFSET: FixedOffset = match FixedOffset::east_opt(7 * 3600) {
    Some(offset) => offset,
    None => panic!("UTC+7 is a valid offset"),
};

/// Singleton record marking how far the mailbox change log has been consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cursor {
    /// Opaque change-log token (Gmail `historyId`).
    pub position: String,
    pub updated_at: DateTime<Utc>,
    /// Number of messages processed in the cycle that saved this position.
    pub items_at_update: u64,
    pub active: bool,
}

/// A message fetched from the mailbox. Never persisted.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Provider-assigned message id.
    pub id: String,
    /// Change-log token associated with this message.
    pub log_position: String,
    pub subject: String,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    pub body_markup: String,
}

/// A transaction as produced by the assembler, before it is tied to a
/// source message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedTransaction {
    pub receiver_account: String,
    pub sender_account: String,
    pub sender_name: String,
    pub sender_bank: String,
    pub transaction_type: String,
    pub transaction_code: String,
    pub transaction_time: DateTime<FixedOffset>,
    /// `true` when the timestamp could not be parsed and fell back to the
    /// processing time.
    pub transaction_time_estimated: bool,
    pub amount_raw: String,
    /// Signed amount in whole currency units.
    pub amount: i64,
    pub fee_raw: String,
    pub fee: i64,
    pub description: String,
}

/// Persisted transaction record.
///
/// Unique by `transaction_code` and by `message_id`. Never mutated once
/// stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub id: String,
    pub receiver_account: String,
    pub sender_account: String,
    pub sender_name: String,
    pub sender_bank: String,
    pub transaction_type: String,
    pub transaction_code: String,
    pub transaction_time: DateTime<FixedOffset>,
    pub transaction_time_estimated: bool,
    pub amount_raw: String,
    pub amount: i64,
    pub fee_raw: String,
    pub fee: i64,
    pub description: String,
    pub message_id: String,
    pub log_position: String,
    pub processed_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Bind a parsed transaction to the message it was extracted from.
    pub fn from_parsed(parsed: ParsedTransaction, message: &RawMessage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            receiver_account: parsed.receiver_account,
            sender_account: parsed.sender_account,
            sender_name: parsed.sender_name,
            sender_bank: parsed.sender_bank,
            transaction_type: parsed.transaction_type,
            transaction_code: parsed.transaction_code,
            transaction_time: parsed.transaction_time,
            transaction_time_estimated: parsed.transaction_time_estimated,
            amount_raw: parsed.amount_raw,
            amount: parsed.amount,
            fee_raw: parsed.fee_raw,
            fee: parsed.fee,
            description: parsed.description,
            message_id: message.id.clone(),
            log_position: message.log_position.clone(),
            processed_at: Utc::now(),
        }
    }
}

/// Aggregate counts reported by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionCounts {
    pub total: i64,
    pub since: i64,
    pub last_processed_at: Option<DateTime<Utc>>,
}
