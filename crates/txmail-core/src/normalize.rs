//! Locale-aware normalization of amount and timestamp values.
//!
//! Amounts are whole currency units (VND) where `.` and `,` are both used
//! as thousands separators and never as a decimal point. Timestamps use the
//! fixed layout `DD/MM/YYYY, HH:MM:SS` in the sender's timezone (UTC+7).

use chrono::{DateTime, FixedOffset, TimeZone, Utc};

use crate::models::SENDER_OFFSET;

/// Parse a raw amount into a signed integer.
///
/// The sign is negative when a `-` appears anywhere in the text. Every `.`
/// and `,` is a thousands separator. Empty or digit-less input yields `0`.
///
/// ```
/// use txmail_core::normalize::normalize_amount;
/// assert_eq!(normalize_amount("+2.000 VND"), 2000);
/// assert_eq!(normalize_amount("-1,500"), -1500);
/// assert_eq!(normalize_amount("n/a"), 0);
/// ```
pub fn normalize_amount(raw: &str) -> i64 {
    let negative = raw.contains('-');

    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let digits: String = kept.chars().filter(|c| *c != '.' && *c != ',').collect();

    let magnitude = digits.parse::<i64>().unwrap_or(0);
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Result of timestamp normalization.
///
/// A failed parse still yields a usable timestamp (the processing time), but
/// the caller can tell it apart and flag the record as low-confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeValue {
    Parsed(DateTime<FixedOffset>),
    FallbackDefaulted(DateTime<FixedOffset>),
}

impl DateTimeValue {
    pub fn value(&self) -> DateTime<FixedOffset> {
        match self {
            DateTimeValue::Parsed(dt) | DateTimeValue::FallbackDefaulted(dt) => *dt,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, DateTimeValue::FallbackDefaulted(_))
    }
}

/// Parse `DD/MM/YYYY, HH:MM[:SS]` as a UTC+7 timestamp.
///
/// Falls back to the current time (in UTC+7) on any malformed input.
pub fn normalize_datetime(raw: &str) -> DateTimeValue {
    normalize_datetime_at(raw, Utc::now())
}

/// Like [`normalize_datetime`], with an explicit fallback instant.
pub fn normalize_datetime_at(raw: &str, now: DateTime<Utc>) -> DateTimeValue {
    match parse_sender_datetime(raw) {
        Some(dt) => DateTimeValue::Parsed(dt),
        None => DateTimeValue::FallbackDefaulted(now.with_timezone(&SENDER_OFFSET)),
    }
}

fn parse_sender_datetime(raw: &str) -> Option<DateTime<FixedOffset>> {
    let (date_part, time_part) = raw.trim().split_once(", ")?;

    let date: Vec<&str> = date_part.trim().split('/').collect();
    let [day, month, year] = date.as_slice() else {
        return None;
    };

    let time: Vec<&str> = time_part.trim().split(':').collect();
    let (hour, minute, second) = match time.as_slice() {
        [h, m] => (*h, *m, "0"),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };

    let day = parse_component(day)?;
    let month = parse_component(month)?;
    let year: i32 = year.trim().parse().ok()?;
    let hour = parse_component(hour)?;
    let minute = parse_component(minute)?;
    let second = parse_component(second)?;

    SENDER_OFFSET
        .with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
}

fn parse_component(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
