//! Metrics engine: single-entity trends and cross-entity pivot / delta tables.
//!
//! Data-quality problems never fail a computation. They degrade the output and
//! are reported as [`DataWarning`]s next to it.
//!
//! Ordering rules:
//! - records are stably sorted by date, so rows sharing a date keep dataset
//!   order (chronological snapshot order, then row order within a table);
//! - in a pivot, the last row for an (entity, date) pair wins, including when
//!   its metric value is null;
//! - the earliest date column of a delta table is kept and is all-null.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::analysis::aggregate::{Dataset, LongRecord};
use crate::analysis::dates::format_label;
use crate::analysis::reference::ReferenceNotes;
use crate::core::config::Config;
use crate::store::value::Value;

/// Non-fatal data-quality finding attached to a metrics result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataWarning {
    /// Requested column is absent from the dataset.
    MissingField { column: String },
    /// Cells in `column` that are neither null nor numeric were treated as null.
    NonNumeric {
        column: String,
        count: usize,
        example: String,
    },
    /// Rows skipped because their snapshot name is not an `MMDDYYYY` date.
    Undated { rows: usize },
    /// Rows skipped because their identifier cell is null.
    MissingIdentifier { rows: usize },
    /// No row carries the requested identifier.
    UnknownEntity { entity: String },
}

impl fmt::Display for DataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { column } => write!(f, "column {column} is missing"),
            Self::NonNumeric {
                column,
                count,
                example,
            } => write!(
                f,
                "{count} non-numeric value(s) in {column} treated as null (e.g. {example:?})"
            ),
            Self::Undated { rows } => {
                write!(f, "{rows} row(s) skipped: snapshot name is not a date")
            }
            Self::MissingIdentifier { rows } => {
                write!(f, "{rows} row(s) skipped: identifier is empty")
            }
            Self::UnknownEntity { entity } => write!(f, "no rows for entity {entity}"),
        }
    }
}

/// Which columns identify an entity, and how numeric text is cleaned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricOptions {
    pub id_column: String,
    pub name_column: String,
    pub separators: Vec<char>,
}

impl MetricOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            id_column: config.metrics.id_column.clone(),
            name_column: config.metrics.name_column.clone(),
            separators: config.ingest.thousands_separators.clone(),
        }
    }
}

impl Default for MetricOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// ──────────────────── trend ────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub snapshot: String,
    pub value: Option<f64>,
    /// Change from the previous point; `None` for the first point or when
    /// either side is null.
    pub delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub entity: String,
    pub metric: String,
    pub points: Vec<TrendPoint>,
    pub warnings: Vec<DataWarning>,
}

impl Trend {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<(NaiveDate, Option<f64>)> {
        self.points.iter().map(|p| (p.date, p.value)).collect()
    }

    pub fn deltas(&self) -> Vec<Option<f64>> {
        self.points.iter().map(|p| p.delta).collect()
    }
}

/// Time series of `metric` for the entity whose identifier renders as `entity`.
pub fn trend(dataset: &Dataset, entity: &str, metric: &str, opts: &MetricOptions) -> Trend {
    let mut result = Trend {
        entity: entity.trim().to_string(),
        metric: metric.to_string(),
        points: Vec::new(),
        warnings: Vec::new(),
    };

    let id_idx = dataset.column_index(&opts.id_column);
    let metric_idx = dataset.column_index(metric);
    if id_idx.is_none() {
        result.warnings.push(DataWarning::MissingField {
            column: opts.id_column.clone(),
        });
    }
    if metric_idx.is_none() {
        result.warnings.push(DataWarning::MissingField {
            column: metric.to_string(),
        });
    }
    let (Some(id_idx), Some(metric_idx)) = (id_idx, metric_idx) else {
        return result;
    };

    let mut matched = 0usize;
    let mut undated = 0usize;
    let mut bad = NonNumericTally::new(metric);
    let mut points: Vec<TrendPoint> = Vec::new();

    for record in &dataset.records {
        if !record.values[id_idx].matches_key(entity) {
            continue;
        }
        matched += 1;
        let Some(date) = record.date else {
            undated += 1;
            continue;
        };
        let cell = &record.values[metric_idx];
        points.push(TrendPoint {
            date,
            snapshot: record.snapshot.clone(),
            value: bad.numeric(cell, &opts.separators),
            delta: None,
        });
    }

    if matched == 0 {
        result.warnings.push(DataWarning::UnknownEntity {
            entity: result.entity.clone(),
        });
        return result;
    }

    points.sort_by_key(|p| p.date);
    for i in 1..points.len() {
        points[i].delta = difference(points[i - 1].value, points[i].value);
    }

    result.points = points;
    result.warnings.extend(bad.into_warning());
    if undated > 0 {
        result.warnings.push(DataWarning::Undated { rows: undated });
    }
    result
}

// ──────────────────── pivot ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotKind {
    /// Raw metric values per date.
    Values,
    /// First differences between consecutive date columns.
    Deltas,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    pub id: Value,
    pub name: Value,
    /// One cell per entry of [`PivotTable::dates`].
    pub cells: Vec<Option<f64>>,
}

/// Wide table: one row per entity, one column per snapshot date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub kind: PivotKind,
    pub metric: String,
    pub id_column: String,
    pub name_column: String,
    /// Chronological column order.
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<PivotRow>,
    pub warnings: Vec<DataWarning>,
}

impl PivotTable {
    fn empty(metric: &str, opts: &MetricOptions, kind: PivotKind) -> Self {
        Self {
            kind,
            metric: metric.to_string(),
            id_column: opts.id_column.clone(),
            name_column: opts.name_column.clone(),
            dates: Vec::new(),
            rows: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Date column labels, optionally annotated with reference notes.
    pub fn labels(&self, format: &str, notes: Option<&ReferenceNotes>) -> Vec<String> {
        self.dates
            .iter()
            .map(|&date| {
                let label = format_label(date, format);
                notes.map_or_else(|| label.clone(), |n| n.annotate(date, &label))
            })
            .collect()
    }

    /// Full header: identifier, name, then one label per date.
    pub fn header(&self, format: &str, notes: Option<&ReferenceNotes>) -> Vec<String> {
        let mut header = vec![self.id_column.clone(), self.name_column.clone()];
        header.extend(self.labels(format, notes));
        header
    }

    /// Cell for `entity` at `date`, if both exist.
    pub fn cell(&self, entity: &str, date: NaiveDate) -> Option<Option<f64>> {
        let col = self.dates.iter().position(|d| *d == date)?;
        let row = self.rows.iter().find(|r| r.id.matches_key(entity))?;
        row.cells.get(col).copied()
    }

    /// Replace every column but the first with its difference from the column
    /// before it. The first column becomes all-null.
    #[must_use]
    pub fn into_deltas(mut self) -> Self {
        if self.kind == PivotKind::Deltas {
            return self;
        }
        for row in &mut self.rows {
            let values = std::mem::take(&mut row.cells);
            row.cells = (0..values.len())
                .map(|i| {
                    if i == 0 {
                        None
                    } else {
                        difference(values[i - 1], values[i])
                    }
                })
                .collect();
        }
        self.kind = PivotKind::Deltas;
        self
    }
}

/// Pivot `metric` into one row per entity and one column per date.
pub fn pivot(dataset: &Dataset, metric: &str, opts: &MetricOptions) -> PivotTable {
    let mut table = PivotTable::empty(metric, opts, PivotKind::Values);

    let id_idx = dataset.column_index(&opts.id_column);
    let metric_idx = dataset.column_index(metric);
    let name_idx = dataset.column_index(&opts.name_column);
    for (idx, column) in [
        (id_idx, &opts.id_column),
        (metric_idx, &metric.to_string()),
        (name_idx, &opts.name_column),
    ] {
        if idx.is_none() {
            table.warnings.push(DataWarning::MissingField {
                column: column.clone(),
            });
        }
    }
    let (Some(id_idx), Some(metric_idx)) = (id_idx, metric_idx) else {
        return table;
    };

    table.dates = dataset.dates();
    let date_pos: HashMap<NaiveDate, usize> = table
        .dates
        .iter()
        .enumerate()
        .map(|(i, d)| (*d, i))
        .collect();

    let mut ordered: Vec<&LongRecord> = dataset.records.iter().collect();
    ordered.sort_by(|a, b| match (a.date, b.date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let mut row_of: HashMap<String, usize> = HashMap::new();
    let mut undated = 0usize;
    let mut missing_id = 0usize;
    let mut bad = NonNumericTally::new(metric);

    for record in ordered {
        let Some(date) = record.date else {
            undated += 1;
            continue;
        };
        let id = &record.values[id_idx];
        let Some(key) = id.key() else {
            missing_id += 1;
            continue;
        };

        let row_idx = *row_of.entry(key).or_insert_with(|| {
            table.rows.push(PivotRow {
                id: id.clone(),
                name: Value::Null,
                cells: vec![None; table.dates.len()],
            });
            table.rows.len() - 1
        });
        let row = &mut table.rows[row_idx];

        if let Some(name_idx) = name_idx {
            let name = &record.values[name_idx];
            if !name.is_null() {
                row.name = name.clone();
            }
        }
        row.cells[date_pos[&date]] = bad.numeric(&record.values[metric_idx], &opts.separators);
    }

    table.warnings.extend(bad.into_warning());
    if undated > 0 {
        table.warnings.push(DataWarning::Undated { rows: undated });
    }
    if missing_id > 0 {
        table
            .warnings
            .push(DataWarning::MissingIdentifier { rows: missing_id });
    }
    table
}

/// Period-over-period change of `metric` per entity.
pub fn delta_pivot(dataset: &Dataset, metric: &str, opts: &MetricOptions) -> PivotTable {
    pivot(dataset, metric, opts).into_deltas()
}

// ──────────────────── helpers ────────────────────

fn difference(prev: Option<f64>, next: Option<f64>) -> Option<f64> {
    match (prev, next) {
        (Some(a), Some(b)) => Some(b - a),
        _ => None,
    }
}

/// Counts non-null cells that failed numeric coercion for one column.
struct NonNumericTally {
    column: String,
    count: usize,
    example: Option<String>,
}

impl NonNumericTally {
    fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
            count: 0,
            example: None,
        }
    }

    fn numeric(&mut self, cell: &Value, separators: &[char]) -> Option<f64> {
        let value = cell.as_f64(separators);
        if value.is_none() && !cell.is_null() {
            self.count += 1;
            if self.example.is_none() {
                self.example = Some(cell.to_string());
            }
        }
        value
    }

    fn into_warning(self) -> Option<DataWarning> {
        (self.count > 0).then(|| DataWarning::NonNumeric {
            column: self.column,
            count: self.count,
            example: self.example.unwrap_or_default(),
        })
    }
}
