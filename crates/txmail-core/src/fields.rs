//! Logical transaction fields and the label synonyms they appear under.
//!
//! The sender's notification template is a table of label/value pairs with
//! Vietnamese labels. Each [`Field`] has a stable key (the name used in
//! logs, JSON, and config) and one or more literal labels, with and without
//! diacritics, to tolerate encoding variants.
//!
//! | Key | Field | Required |
//! |-----|-------|----------|
//! | `taiKhoanNhan` | receiver account | yes |
//! | `taiKhoanChuyen` | sender account | yes |
//! | `tenNguoiChuyen` | sender name | |
//! | `nganHangChuyen` | sender bank | |
//! | `loaiGiaoDich` | transaction type | |
//! | `maGiaoDich` | transaction code | yes |
//! | `ngayGioGiaoDich` | transaction time | |
//! | `soTien` | amount | yes |
//! | `phiGiaoDich` | fee | |
//! | `noiDungGiaoDich` | description | |

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    ReceiverAccount,
    SenderAccount,
    SenderName,
    SenderBank,
    TransactionType,
    TransactionCode,
    TransactionTime,
    Amount,
    Fee,
    Description,
}

impl Field {
    /// Every field, in template order.
    pub const ALL: [Field; 10] = [
        Field::ReceiverAccount,
        Field::SenderAccount,
        Field::SenderName,
        Field::SenderBank,
        Field::TransactionType,
        Field::TransactionCode,
        Field::TransactionTime,
        Field::Amount,
        Field::Fee,
        Field::Description,
    ];

    /// Fields that must be present and non-blank for a record to be accepted.
    pub const REQUIRED: [Field; 4] = [
        Field::ReceiverAccount,
        Field::SenderAccount,
        Field::TransactionCode,
        Field::Amount,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::ReceiverAccount => "taiKhoanNhan",
            Field::SenderAccount => "taiKhoanChuyen",
            Field::SenderName => "tenNguoiChuyen",
            Field::SenderBank => "nganHangChuyen",
            Field::TransactionType => "loaiGiaoDich",
            Field::TransactionCode => "maGiaoDich",
            Field::TransactionTime => "ngayGioGiaoDich",
            Field::Amount => "soTien",
            Field::Fee => "phiGiaoDich",
            Field::Description => "noiDungGiaoDich",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.key() == key)
    }

    /// Built-in labels as printed by the sender's template.
    pub fn default_labels(self) -> &'static [&'static str] {
        match self {
            Field::ReceiverAccount => &["Tài khoản nhận", "Tai khoan nhan"],
            Field::SenderAccount => &["Tài khoản chuyển", "Tai khoan chuyen"],
            Field::SenderName => &["Tên người chuyển", "Ten nguoi chuyen"],
            Field::SenderBank => &["Ngân hàng chuyển", "Ngan hang chuyen"],
            Field::TransactionType => &["Loại giao dịch", "Loai giao dich"],
            Field::TransactionCode => &["Mã giao dịch", "Ma giao dich"],
            Field::TransactionTime => &["Ngày giờ giao dịch", "Ngay gio giao dich"],
            Field::Amount => &["Số tiền", "So tien"],
            Field::Fee => &["Phí giao dịch", "Phi giao dich"],
            Field::Description => &["Nội dung giao dịch", "Noi dung giao dich"],
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Label synonyms recognized by the extractor, per field.
///
/// Starts from [`Field::default_labels`]; deployments can add synonyms
/// through `[extraction.labels]` in the config file.
#[derive(Debug, Clone)]
pub struct LabelTable {
    entries: Vec<(Field, Vec<String>)>,
}

impl Default for LabelTable {
    fn default() -> Self {
        let entries = Field::ALL
            .into_iter()
            .map(|f| {
                let labels = f.default_labels().iter().map(|s| s.to_string()).collect();
                (f, labels)
            })
            .collect();
        Self { entries }
    }
}

impl LabelTable {
    /// Append extra synonyms for `field`. Blank and duplicate labels are ignored.
    pub fn add_synonyms<I, S>(&mut self, field: Field, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(f, _)| *f == field) {
            for label in labels {
                let label: String = label.into();
                let label = label.trim().to_string();
                if !label.is_empty() && !existing.contains(&label) {
                    existing.push(label);
                }
            }
        }
    }

    /// Iterate `(field, labels)` pairs in template order.
    pub fn iter(&self) -> impl Iterator<Item = (Field, &[String])> {
        self.entries.iter().map(|(f, l)| (*f, l.as_slice()))
    }

    pub fn labels(&self, field: Field) -> &[String] {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, l)| l.as_slice())
            .unwrap_or(&[])
    }
}

/// Raw values found in one document, one optional slot per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub receiver_account: Option<String>,
    pub sender_account: Option<String>,
    pub sender_name: Option<String>,
    pub sender_bank: Option<String>,
    pub transaction_type: Option<String>,
    pub transaction_code: Option<String>,
    pub transaction_time: Option<String>,
    pub amount: Option<String>,
    pub fee: Option<String>,
    pub description: Option<String>,
}

impl ExtractedFields {
    fn slot(&self, field: Field) -> &Option<String> {
        match field {
            Field::ReceiverAccount => &self.receiver_account,
            Field::SenderAccount => &self.sender_account,
            Field::SenderName => &self.sender_name,
            Field::SenderBank => &self.sender_bank,
            Field::TransactionType => &self.transaction_type,
            Field::TransactionCode => &self.transaction_code,
            Field::TransactionTime => &self.transaction_time,
            Field::Amount => &self.amount,
            Field::Fee => &self.fee,
            Field::Description => &self.description,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::ReceiverAccount => &mut self.receiver_account,
            Field::SenderAccount => &mut self.sender_account,
            Field::SenderName => &mut self.sender_name,
            Field::SenderBank => &mut self.sender_bank,
            Field::TransactionType => &mut self.transaction_type,
            Field::TransactionCode => &mut self.transaction_code,
            Field::TransactionTime => &mut self.transaction_time,
            Field::Amount => &mut self.amount,
            Field::Fee => &mut self.fee,
            Field::Description => &mut self.description,
        }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn is_resolved(&self, field: Field) -> bool {
        self.slot(field).is_some()
    }

    /// Store `value` unless the field already holds one. First match wins.
    pub fn set_if_absent(&mut self, field: Field, value: String) -> bool {
        let slot = self.slot_mut(field);
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }

    /// Required fields that are missing or blank after trimming.
    pub fn missing_required(&self) -> Vec<Field> {
        Field::REQUIRED
            .into_iter()
            .filter(|f| self.get(*f).map_or(true, |v| v.trim().is_empty()))
            .collect()
    }

    pub fn resolved_count(&self) -> usize {
        Field::ALL.iter().filter(|f| self.is_resolved(**f)).count()
    }

    /// Key → value view for display and JSON output.
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        Field::ALL
            .into_iter()
            .filter_map(|f| self.get(f).map(|v| (f.key(), v.to_string())))
            .collect()
    }
}

impl Serialize for ExtractedFields {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}
