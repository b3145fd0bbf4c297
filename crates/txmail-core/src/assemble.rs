//! Turns a notification document into a validated transaction.

use crate::extract::Extractor;
use crate::fields::{ExtractedFields, Field};
use crate::models::ParsedTransaction;
use crate::normalize::{normalize_amount, normalize_datetime, DateTimeValue};

/// Outcome of assembling one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    /// Incoming funds; eligible for persistence.
    Accepted(ParsedTransaction),
    /// Negative amount. Never persisted.
    Outgoing(ParsedTransaction),
    /// One or more required fields were missing or blank. Not an error:
    /// the mailbox also receives marketing mail and other templates.
    Incomplete { missing: Vec<Field> },
}

/// Runs extraction, normalization, and validation.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    extractor: Extractor,
}

impl Assembler {
    pub fn new(extractor: Extractor) -> Self {
        Self { extractor }
    }

    pub fn assemble(&self, markup: &str) -> Assembly {
        let fields = self.extractor.extract(markup);
        assemble_fields(&fields)
    }
}

/// Validate and normalize already-extracted fields.
pub fn assemble_fields(fields: &ExtractedFields) -> Assembly {
    let missing = fields.missing_required();
    if !missing.is_empty() {
        return Assembly::Incomplete { missing };
    }

    let text = |f: Field| fields.get(f).unwrap_or_default().trim().to_string();

    let amount_raw = text(Field::Amount);
    let amount = normalize_amount(&amount_raw);
    let fee_raw = text(Field::Fee);
    let fee = if fee_raw.is_empty() {
        0
    } else {
        normalize_amount(&fee_raw)
    };

    let time_raw = text(Field::TransactionTime);
    let time = normalize_datetime(&time_raw);
    if let DateTimeValue::FallbackDefaulted(at) = time {
        tracing::warn!(
            raw = %time_raw,
            fallback = %at,
            code = %text(Field::TransactionCode),
            "transaction time did not parse; using processing time"
        );
    }

    let parsed = ParsedTransaction {
        receiver_account: text(Field::ReceiverAccount),
        sender_account: text(Field::SenderAccount),
        sender_name: text(Field::SenderName),
        sender_bank: text(Field::SenderBank),
        transaction_type: text(Field::TransactionType),
        transaction_code: text(Field::TransactionCode),
        transaction_time: time.value(),
        transaction_time_estimated: time.is_fallback(),
        amount_raw,
        amount,
        fee_raw,
        fee,
        description: text(Field::Description),
    };

    if parsed.amount < 0 {
        Assembly::Outgoing(parsed)
    } else {
        Assembly::Accepted(parsed)
    }
}
