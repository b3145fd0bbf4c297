//! `txmail parse`: run extraction and assembly on a saved email body.
//!
//! Touches neither the mailbox nor the database, so it is the quickest way
//! to check label synonyms against a new notification template.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use txmail_core::assemble::{assemble_fields, Assembly};
use txmail_core::extract::Extractor;
use txmail_core::fields::{ExtractedFields, LabelTable};
use txmail_core::models::ParsedTransaction;

#[derive(Debug, Serialize)]
pub struct ParseReport {
    pub fields: ExtractedFields,
    /// `accepted`, `outgoing`, or `incomplete`.
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<ParsedTransaction>,
}

pub fn parse_markup(markup: &str, labels: LabelTable) -> ParseReport {
    let fields = Extractor::new(labels).extract(markup);
    let (outcome, missing, transaction) = match assemble_fields(&fields) {
        Assembly::Accepted(tx) => ("accepted", Vec::new(), Some(tx)),
        Assembly::Outgoing(tx) => ("outgoing", Vec::new(), Some(tx)),
        Assembly::Incomplete { missing } => (
            "incomplete",
            missing.iter().map(|f| f.key()).collect(),
            None,
        ),
    };
    ParseReport {
        fields,
        outcome,
        missing,
        transaction,
    }
}

/// Print the parse report for `path` as pretty JSON.
pub fn run_parse(path: &Path, labels: LabelTable) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let markup = String::from_utf8_lossy(&bytes);
    let report = parse_markup(&markup, labels);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report_incomplete() {
        let report = parse_markup(
            "<table><tr><td>Mã giao dịch</td><td>ABC123</td></tr></table>",
            LabelTable::default(),
        );
        assert_eq!(report.outcome, "incomplete");
        assert_eq!(report.fields.to_map()["maGiaoDich"], "ABC123");
        assert!(report.missing.contains(&"soTien"));
        assert!(report.transaction.is_none());
    }
}
