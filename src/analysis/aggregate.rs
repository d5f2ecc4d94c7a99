//! Aggregator: concatenate snapshot tables into one long-form, date-tagged dataset.
//!
//! Column policy for ragged schemas: the dataset's columns are the union of all
//! snapshot columns in first-seen order. Cells a snapshot does not have are
//! `Null`. Rows whose snapshot name is not a date stay in the output with
//! `date = None`.

#![allow(missing_docs)]

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::analysis::dates::parse_snapshot_date;
use crate::core::errors::Result;
use crate::store::sqlite::SnapshotStore;
use crate::store::table::Table;
use crate::store::value::Value;

/// One row of the long-form dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongRecord {
    /// Snapshot (table) the row came from.
    pub snapshot: String,
    /// Date decoded from the snapshot name.
    pub date: Option<NaiveDate>,
    /// Values aligned with [`Dataset::columns`].
    pub values: Vec<Value>,
}

/// Row-wise concatenation of snapshots, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub records: Vec<LongRecord>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell of `record` in `column`, `None` if the column is absent.
    pub fn value<'a>(&self, record: &'a LongRecord, column: &str) -> Option<&'a Value> {
        self.column_index(column).and_then(|i| record.values.get(i))
    }

    /// Distinct snapshot dates in ascending order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.records.iter().filter_map(|r| r.date).collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }

    /// Number of rows whose snapshot name did not decode to a date.
    pub fn undated_count(&self) -> usize {
        self.records.iter().filter(|r| r.date.is_none()).count()
    }
}

/// Read `names` from the store and aggregate them in the order given.
pub fn aggregate(store: &SnapshotStore, names: &[String]) -> Result<Dataset> {
    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        tables.push((name.clone(), store.read_snapshot(name)?));
    }
    Ok(aggregate_tables(tables))
}

/// Aggregate already-loaded `(snapshot name, table)` pairs.
pub fn aggregate_tables<I>(tables: I) -> Dataset
where
    I: IntoIterator<Item = (String, Table)>,
{
    let tables: Vec<(String, Table)> = tables.into_iter().collect();

    let mut columns: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (_, table) in &tables {
        for col in &table.columns {
            if !positions.contains_key(col) {
                positions.insert(col.clone(), columns.len());
                columns.push(col.clone());
            }
        }
    }

    let total_rows = tables.iter().map(|(_, t)| t.len()).sum();
    let mut records = Vec::with_capacity(total_rows);
    for (name, table) in tables {
        let date = parse_snapshot_date(&name);
        let mapping: Vec<usize> = table.columns.iter().map(|c| positions[c]).collect();
        for row in table.rows {
            let mut values = vec![Value::Null; columns.len()];
            for (src, cell) in row.into_iter().enumerate() {
                if let Some(&dst) = mapping.get(src) {
                    values[dst] = cell;
                }
            }
            records.push(LongRecord {
                snapshot: name.clone(),
                date,
                values,
            });
        }
    }

    Dataset { columns, records }
}
