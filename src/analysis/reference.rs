//! Optional event notes keyed by date, used to annotate pivot column labels.
//!
//! The file is a CSV with `date`, `location` and `reason` columns. Dates may be
//! `MMDDYYYY`, `YYYY-MM-DD` or `MM/DD/YYYY`. Problems never fail a computation:
//! the loader returns whatever it could read plus a list of problems.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::analysis::dates::parse_snapshot_date;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub location: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ReferenceNotes {
    pub notes: BTreeMap<NaiveDate, Note>,
}

/// Result of loading a reference file.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLoad {
    pub notes: ReferenceNotes,
    pub problems: Vec<String>,
}

impl ReferenceNotes {
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&Note> {
        self.notes.get(&date)
    }

    /// `label` with the note for `date` appended, or `label` unchanged.
    pub fn annotate(&self, date: NaiveDate, label: &str) -> String {
        match self.notes.get(&date) {
            Some(note) if !note.location.is_empty() || !note.reason.is_empty() => {
                format!("{label} ({}: {})", note.location, note.reason)
            }
            _ => label.to_string(),
        }
    }

    /// Load notes from `path`. A missing or unreadable file yields empty notes
    /// and a problem entry.
    pub fn load(path: &Path) -> ReferenceLoad {
        match csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)
        {
            Ok(reader) => Self::from_reader(reader),
            Err(e) => ReferenceLoad {
                notes: Self::default(),
                problems: vec![format!("cannot read {}: {e}", path.display())],
            },
        }
    }

    /// Parse notes from any CSV reader.
    pub fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> ReferenceLoad {
        let mut load = ReferenceLoad::default();

        let headers = match reader.headers() {
            Ok(h) => h.clone(),
            Err(e) => {
                load.problems.push(format!("unreadable header: {e}"));
                return load;
            }
        };
        let position = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let Some(date_idx) = position("date") else {
            load.problems.push("missing column date".to_string());
            return load;
        };
        let location_idx = position("location");
        let reason_idx = position("reason");

        for (line, record) in reader.records().enumerate() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    load.problems.push(format!("row {}: {e}", line + 1));
                    continue;
                }
            };
            let raw_date = record.get(date_idx).unwrap_or_default();
            let Some(date) = parse_note_date(raw_date) else {
                load.problems
                    .push(format!("row {}: unrecognized date {raw_date:?}", line + 1));
                continue;
            };
            let field = |idx: Option<usize>| {
                idx.and_then(|i| record.get(i))
                    .unwrap_or_default()
                    .to_string()
            };
            load.notes.notes.insert(
                date,
                Note {
                    location: field(location_idx),
                    reason: field(reason_idx),
                },
            );
        }
        load
    }
}

fn parse_note_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    parse_snapshot_date(raw)
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .or_else(|| NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok())
}
