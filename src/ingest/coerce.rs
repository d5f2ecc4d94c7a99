//! Column-wise integer coercion for freshly parsed snapshot tables.
//!
//! A column becomes integer only when every non-null cell, with thousands
//! separators removed, parses as `i64`. One bad cell leaves the whole column
//! as text.

use crate::store::table::Table;
use crate::store::value::Value;

/// Parse `raw` as an integer after dropping every character in `separators`.
pub fn parse_integer(raw: &str, separators: &[char]) -> Option<i64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !separators.contains(c))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<i64>().ok()
}

/// Integer values for one column, or `None` if any non-null cell is not an integer.
fn coerce_column(table: &Table, idx: usize, separators: &[char]) -> Option<Vec<Option<i64>>> {
    let mut out = Vec::with_capacity(table.len());
    let mut saw_value = false;
    for row in &table.rows {
        match row.get(idx) {
            Some(Value::Null) | None => out.push(None),
            Some(Value::Integer(i)) => {
                saw_value = true;
                out.push(Some(*i));
            }
            Some(Value::Text(s)) => {
                saw_value = true;
                out.push(Some(parse_integer(s, separators)?));
            }
            Some(Value::Real(_)) => return None,
        }
    }
    saw_value.then_some(out)
}

/// Coerce every eligible column of `table` in place. Returns the names of the
/// columns that were converted.
pub fn coerce_table(table: &mut Table, separators: &[char]) -> Vec<String> {
    let mut converted = Vec::new();
    for idx in 0..table.columns.len() {
        let Some(values) = coerce_column(table, idx, separators) else {
            continue;
        };
        for (row, value) in table.rows.iter_mut().zip(values) {
            if let (Some(cell), Some(v)) = (row.get_mut(idx), value) {
                *cell = Value::Integer(v);
            }
        }
        converted.push(table.columns[idx].clone());
    }
    converted
}
