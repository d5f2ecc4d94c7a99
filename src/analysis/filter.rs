//! Row filters for interactive snapshot browsing.
//!
//! Two forms are accepted on the command line:
//! - `column=value` keeps rows whose cell equals `value` (integer-aware);
//! - `column:min:max` keeps rows whose numeric cell lies in `[min, max]`.
//!
//! Multiple filters combine with AND.

#![allow(missing_docs)]

use std::str::FromStr;

use serde::Serialize;

use crate::core::errors::{KstError, Result};
use crate::store::table::Table;
use crate::store::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RowFilter {
    Equals { column: String, value: String },
    Range { column: String, min: f64, max: f64 },
}

impl RowFilter {
    pub fn column(&self) -> &str {
        match self {
            Self::Equals { column, .. } | Self::Range { column, .. } => column,
        }
    }

    fn keeps(&self, cell: &Value, separators: &[char]) -> bool {
        match self {
            Self::Equals { value, .. } => cell.matches_key(value),
            Self::Range { min, max, .. } => cell
                .as_f64(separators)
                .is_some_and(|v| v >= *min && v <= *max),
        }
    }
}

impl FromStr for RowFilter {
    type Err = KstError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = |details: String| KstError::InvalidQuery { details };

        if let Some((column, value)) = raw.split_once('=') {
            let column = column.trim();
            if column.is_empty() {
                return Err(invalid(format!("filter {raw:?} has no column")));
            }
            return Ok(Self::Equals {
                column: column.to_string(),
                value: value.trim().to_string(),
            });
        }

        let parts: Vec<&str> = raw.rsplitn(3, ':').collect();
        if let [max, min, column] = parts.as_slice() {
            let column = column.trim();
            if column.is_empty() {
                return Err(invalid(format!("filter {raw:?} has no column")));
            }
            let parse = |s: &str| {
                s.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| invalid(format!("range bound {s:?} in {raw:?} is not a number")))
            };
            let (min, max) = (parse(min)?, parse(max)?);
            if min > max {
                return Err(invalid(format!("range {raw:?} has min greater than max")));
            }
            return Ok(Self::Range {
                column: column.to_string(),
                min,
                max,
            });
        }

        Err(invalid(format!(
            "filter {raw:?} must look like column=value or column:min:max"
        )))
    }
}

/// Keep only the rows of `table` that pass every filter.
///
/// Fails when a filter names a column the table does not have.
pub fn apply_filters(table: &Table, filters: &[RowFilter], separators: &[char]) -> Result<Table> {
    let mut resolved = Vec::with_capacity(filters.len());
    for filter in filters {
        let idx = table
            .column_index(filter.column())
            .ok_or_else(|| KstError::InvalidQuery {
                details: format!("unknown column {:?}", filter.column()),
            })?;
        resolved.push((idx, filter));
    }

    let rows = table
        .rows
        .iter()
        .filter(|row| {
            resolved
                .iter()
                .all(|(idx, f)| row.get(*idx).is_some_and(|cell| f.keeps(cell, separators)))
        })
        .cloned()
        .collect();

    Ok(Table {
        columns: table.columns.clone(),
        rows,
    })
}
