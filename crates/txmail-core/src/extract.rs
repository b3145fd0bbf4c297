//! Label/value extraction from notification HTML.
//!
//! The sender renders each transaction as table rows where a label cell
//! (e.g. `Mã giao dịch`) is followed either by a value cell in the same row
//! or by a row holding the value underneath. The template mixes both
//! layouts, so for every label cell the extractor tries:
//!
//! 1. sibling cells in the same row, skipping the label cell and anything
//!    that still contains the label text;
//! 2. the full text of the next row.
//!
//! Only leaf cells (cells without nested cells) are treated as labels, so an
//! outer layout cell that merely *contains* the whole table never matches.
//! The first value found for a field wins.

use scraper::{ElementRef, Html};

use crate::fields::{ExtractedFields, Field, LabelTable};

/// Locates known fields in a markup document.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    labels: LabelTable,
}

impl Extractor {
    pub fn new(labels: LabelTable) -> Self {
        Self { labels }
    }

    /// Extract raw field values from `markup`. Fields that are not found
    /// stay `None`; this never fails.
    pub fn extract(&self, markup: &str) -> ExtractedFields {
        let document = Html::parse_document(markup);
        let mut fields = ExtractedFields::default();

        for cell in document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(is_cell)
        {
            if has_nested_cells(&cell) {
                continue;
            }
            let cell_text = collapse_whitespace(&cell_text(&cell));
            if cell_text.is_empty() {
                continue;
            }

            for (field, labels) in self.labels.iter() {
                if fields.is_resolved(field) {
                    continue;
                }
                for label in labels {
                    if !cell_text.contains(label.as_str()) {
                        continue;
                    }
                    if let Some(value) = find_value(&cell, label) {
                        let cleaned = clean_value(field, &value);
                        tracing::trace!(field = %field, value = %cleaned, "matched label");
                        fields.set_if_absent(field, cleaned);
                        break;
                    }
                }
            }
        }

        fields
    }
}

fn is_cell(element: &ElementRef<'_>) -> bool {
    matches!(element.value().name(), "td" | "th")
}

fn has_nested_cells(cell: &ElementRef<'_>) -> bool {
    cell.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|e| is_cell(&e))
}

fn cell_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn enclosing_row<'a>(cell: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    cell.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "tr")
}

/// Search for the value belonging to a label cell.
fn find_value(label_cell: &ElementRef<'_>, label: &str) -> Option<String> {
    let row = enclosing_row(label_cell)?;

    // Same row, other cells.
    for sibling in row.children().filter_map(ElementRef::wrap).filter(is_cell) {
        if sibling.id() == label_cell.id() {
            continue;
        }
        let text = collapse_whitespace(&cell_text(&sibling));
        if !text.is_empty() && text != label && !text.contains(label) {
            return Some(text);
        }
    }

    // Next row, whole text.
    let next_row = row
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "tr")?;
    let text = collapse_whitespace(&cell_text(&next_row));
    if !text.is_empty() && !text.contains(label) {
        return Some(text);
    }

    None
}

/// Per-field cleanup of a raw value. Transaction codes keep only ASCII
/// word characters; everything else is whitespace-collapsed.
fn clean_value(field: Field, value: &str) -> String {
    match field {
        Field::TransactionCode => value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect(),
        _ => collapse_whitespace(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(rows: &str) -> String {
        format!("<html><body><table>{}</table></body></html>", rows)
    }

    #[test]
    fn test_value_in_same_row() {
        let html = wrap("<tr><td>Mã giao dịch</td><td>ABC123</td></tr>");
        let fields = Extractor::default().extract(&html);
        assert_eq!(fields.get(Field::TransactionCode), Some("ABC123"));
        assert_eq!(Field::from_key("maGiaoDich"), Some(Field::TransactionCode));
    }

    #[test]
    fn test_value_in_next_row() {
        let html = wrap(
            "<tr><td>Số tiền</td></tr>\
             <tr><td>+2.000 VND</td></tr>",
        );
        let fields = Extractor::default().extract(&html);
        assert_eq!(fields.get(Field::Amount), Some("+2.000 VND"));
    }

    #[test]
    fn test_unaccented_label_variant() {
        let html = wrap("<tr><td>Tai khoan nhan</td><td>  0011 2233  </td></tr>");
        let fields = Extractor::default().extract(&html);
        assert_eq!(fields.get(Field::ReceiverAccount), Some("0011 2233"));
    }

    #[test]
    fn test_label_with_trailing_colon() {
        let html = wrap("<tr><td>Ngân hàng chuyển:</td><td>Vietcombank</td></tr>");
        let fields = Extractor::default().extract(&html);
        assert_eq!(fields.get(Field::SenderBank), Some("Vietcombank"));
    }

    #[test]
    fn test_skips_sibling_repeating_label() {
        let html = wrap(
            "<tr><td>Tên người chuyển</td><td>Tên người chuyển</td><td>NGUYEN VAN A</td></tr>",
        );
        let fields = Extractor::default().extract(&html);
        assert_eq!(fields.get(Field::SenderName), Some("NGUYEN VAN A"));
    }

    #[test]
    fn test_first_match_wins() {
        let html = wrap(
            "<tr><td>Mã giao dịch</td><td>FIRST1</td></tr>\
             <tr><td>Mã giao dịch</td><td>SECOND2</td></tr>",
        );
        let fields = Extractor::default().extract(&html);
        assert_eq!(fields.get(Field::TransactionCode), Some("FIRST1"));
    }

    #[test]
    fn test_transaction_code_keeps_word_chars_only() {
        let html = wrap("<tr><td>Mã giao dịch</td><td>FT-2508 06/ABC</td></tr>");
        let fields = Extractor::default().extract(&html);
        assert_eq!(fields.get(Field::TransactionCode), Some("FT250806ABC"));
    }

    #[test]
    fn test_nested_layout_tables() {
        let html = r#"
            <html><body>
            <table><tr><td>
              <table>
                <tr><td>Tài khoản nhận</td><td>0123456789</td></tr>
                <tr><td>Nội dung giao dịch</td><td>
                    chuyen   tien
                    an trua
                </td></tr>
              </table>
            </td></tr></table>
            </body></html>
        "#;
        let fields = Extractor::default().extract(html);
        assert_eq!(fields.get(Field::ReceiverAccount), Some("0123456789"));
        assert_eq!(fields.get(Field::Description), Some("chuyen tien an trua"));
    }

    #[test]
    fn test_missing_fields_are_none() {
        let html = wrap("<tr><td>Hello</td><td>World</td></tr>");
        let fields = Extractor::default().extract(&html);
        assert_eq!(fields.resolved_count(), 0);
    }

    #[test]
    fn test_label_without_value_is_unresolved() {
        let html = wrap("<tr><td>Phí giao dịch</td></tr>");
        let fields = Extractor::default().extract(&html);
        assert_eq!(fields.get(Field::Fee), None);
    }

    #[test]
    fn test_configured_synonym() {
        let mut labels = LabelTable::default();
        labels.add_synonyms(Field::TransactionCode, ["Mã GD"]);
        let html = wrap("<tr><td>Mã GD</td><td>ZZ99</td></tr>");
        let fields = Extractor::new(labels).extract(&html);
        assert_eq!(fields.get(Field::TransactionCode), Some("ZZ99"));
    }

    #[test]
    fn test_not_html_at_all() {
        let fields = Extractor::default().extract("plain text, no markup");
        assert_eq!(fields, ExtractedFields::default());
    }
}
