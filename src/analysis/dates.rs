//! Snapshot names encode their date as `MMDDYYYY`.

use std::fmt::Write as _;

use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};

use crate::core::errors::{KstError, Result};

/// `chrono` pattern for snapshot names.
pub const SNAPSHOT_NAME_FORMAT: &str = "%m%d%Y";

/// Parse a snapshot name as a date. Anything other than eight digits forming a
/// real calendar date yields `None`.
pub fn parse_snapshot_date(name: &str) -> Option<NaiveDate> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(name, SNAPSHOT_NAME_FORMAT).ok()
}

/// Inverse of [`parse_snapshot_date`].
pub fn format_snapshot_name(date: NaiveDate) -> String {
    date.format(SNAPSHOT_NAME_FORMAT).to_string()
}

/// Render `date` with `format`, or `None` when the format needs fields a plain
/// date does not carry (times, offsets, timestamps).
pub fn try_format_label(date: NaiveDate, format: &str) -> Option<String> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return None;
    }
    let mut out = String::new();
    write!(out, "{}", date.format(format)).ok()?;
    Some(out)
}

/// Render a column label. Falls back to ISO `YYYY-MM-DD` when `format`
/// cannot render a date.
pub fn format_label(date: NaiveDate, format: &str) -> String {
    try_format_label(date, format).unwrap_or_else(|| date.to_string())
}

/// Reject label formats that `chrono` cannot render.
pub fn validate_label_format(format: &str) -> Result<()> {
    if format.trim().is_empty() {
        return Err(KstError::InvalidConfig {
            details: "metrics.label_format must not be empty".to_string(),
        });
    }
    let sample = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap_or_default();
    if try_format_label(sample, format).is_none() {
        return Err(KstError::InvalidConfig {
            details: format!("metrics.label_format {format:?} is not a valid date format"),
        });
    }
    Ok(())
}

/// Order snapshot names chronologically: dated names by date, then undated ones;
/// ties broken by name.
pub fn sort_chronologically(names: &mut [String]) {
    names.sort_by(|a, b| {
        let da = parse_snapshot_date(a);
        let db = parse_snapshot_date(b);
        match (da, db) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.cmp(b),
        }
    });
}
