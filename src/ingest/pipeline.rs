//! Ingestion pipeline: directory of CSV snapshots → SQLite tables.
//!
//! Files are visited in lexical filename order. In incremental mode each file
//! is committed on its own and failures are collected in the report. In atomic
//! mode every file is parsed first and all tables land in one transaction, or
//! none do.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::config::Config;
use crate::core::errors::{KstError, Result};
use crate::core::paths::{has_snapshot_extension, snapshot_name};
use crate::ingest::coerce::coerce_table;
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};
use crate::store::sqlite::SnapshotStore;
use crate::store::table::Table;
use crate::store::value::Value;

/// Knobs for one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Snapshot extension without the dot, compared case-insensitively.
    pub extension: String,
    pub separators: Vec<char>,
    pub atomic: bool,
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            extension: config.ingest.extension.clone(),
            separators: config.ingest.thousands_separators.clone(),
            atomic: config.ingest.atomic,
        }
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A snapshot that made it into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedSnapshot {
    pub name: String,
    pub path: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
    pub integer_columns: Vec<String>,
    /// SHA-256 of the source file, hex encoded.
    pub fingerprint: String,
}

/// A snapshot file that could not be ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub code: String,
    pub message: String,
}

impl IngestFailure {
    fn new(path: &Path, err: &KstError) -> Self {
        Self {
            path: path.to_path_buf(),
            code: err.root().code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct IngestReport {
    pub data_dir: PathBuf,
    pub atomic: bool,
    pub loaded: Vec<LoadedSnapshot>,
    pub failures: Vec<IngestFailure>,
    /// Entries skipped because they are not snapshot files.
    pub ignored: Vec<PathBuf>,
    pub duration_ms: u64,
}

impl IngestReport {
    /// Whether every snapshot file was ingested.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn loaded_names(&self) -> Vec<&str> {
        self.loaded.iter().map(|s| s.name.as_str()).collect()
    }
}

/// A parsed snapshot file ready to be written.
#[derive(Debug, Clone)]
pub struct ParsedSnapshot {
    pub name: String,
    pub path: PathBuf,
    pub table: Table,
    pub integer_columns: Vec<String>,
    pub fingerprint: String,
}

impl ParsedSnapshot {
    fn summary(&self) -> LoadedSnapshot {
        LoadedSnapshot {
            name: self.name.clone(),
            path: self.path.clone(),
            rows: self.table.len(),
            columns: self.table.columns.clone(),
            integer_columns: self.integer_columns.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }
}

/// Snapshot files in `dir` (sorted) and everything else that was skipped.
pub fn scan_directory(dir: &Path, extension: &str) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    if !dir.is_dir() {
        return Err(KstError::MissingInputDir {
            path: dir.to_path_buf(),
        });
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|source| KstError::io(dir, source))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()
        .map_err(|source| KstError::io(dir, source))?;
    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let (snapshots, ignored): (Vec<PathBuf>, Vec<PathBuf>) = entries
        .into_iter()
        .partition(|p| p.is_file() && has_snapshot_extension(p, extension));
    Ok((snapshots, ignored))
}

/// Parse CSV text into a coerced table.
pub fn read_csv<R: Read>(reader: R, separators: &[char]) -> Result<(Table, Vec<String>)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(reader);

    let columns: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
    if columns.is_empty() || columns.iter().all(String::is_empty) {
        return Err(KstError::Csv {
            details: "missing header row".to_string(),
        });
    }
    if let Some(dup) = first_duplicate(&columns) {
        return Err(KstError::Csv {
            details: format!("duplicate column {dup:?}"),
        });
    }

    let mut table = Table::new(columns);
    for record in csv_reader.records() {
        let record = record?;
        table.rows.push(record.iter().map(Value::from_field).collect());
    }
    let integer_columns = coerce_table(&mut table, separators);
    Ok((table, integer_columns))
}

/// Read, fingerprint and parse one snapshot file.
pub fn parse_snapshot_file(path: &Path, separators: &[char]) -> Result<ParsedSnapshot> {
    let name = snapshot_name(path)
        .ok_or_else(|| KstError::ingest(path, "file name is not valid UTF-8"))?;
    let bytes = fs::read(path).map_err(|source| KstError::io(path, source))?;
    let fingerprint = sha256_hex(&bytes);
    let (table, integer_columns) =
        read_csv(bytes.as_slice(), separators).map_err(|e| KstError::ingest(path, e.to_string()))?;
    Ok(ParsedSnapshot {
        name,
        path: path.to_path_buf(),
        table,
        integer_columns,
        fingerprint,
    })
}

/// Ingest every snapshot file in `dir` into `store`.
///
/// A missing directory fails the run. Per-file failures fail the run only in
/// atomic mode.
pub fn ingest_directory(
    dir: &Path,
    store: &mut SnapshotStore,
    opts: &IngestOptions,
    log: &mut JsonlWriter,
) -> Result<IngestReport> {
    let started = Instant::now();
    let mut start = LogEntry::new(EventType::IngestStart, Severity::Info).with_path(dir);
    start.details = Some(if opts.atomic { "atomic" } else { "incremental" }.to_string());
    log.write_entry(&start);

    let (files, ignored) = match scan_directory(dir, &opts.extension) {
        Ok(found) => found,
        Err(e) => {
            log.write_entry(&LogEntry::failure(EventType::Error, &e).with_path(dir));
            return Err(e);
        }
    };

    let mut report = IngestReport {
        data_dir: dir.to_path_buf(),
        atomic: opts.atomic,
        ignored,
        ..IngestReport::default()
    };

    let (files, collisions) = split_name_collisions(files);
    for (path, err) in collisions {
        log.write_entry(&LogEntry::failure(EventType::SnapshotFailed, &err).with_path(&path));
        if opts.atomic {
            return Err(err);
        }
        report.failures.push(IngestFailure::new(&path, &err));
    }

    if opts.atomic {
        ingest_atomic(&files, store, opts, log, &mut report)?;
    } else {
        ingest_incremental(&files, store, opts, log, &mut report);
    }

    report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut done = LogEntry::new(EventType::IngestComplete, Severity::Info).with_path(dir);
    done.ok = Some(report.is_clean());
    done.duration_ms = Some(report.duration_ms);
    done.rows = Some(report.loaded.iter().map(|s| s.rows as u64).sum());
    done.details = Some(format!(
        "loaded={} failed={} ignored={}",
        report.loaded.len(),
        report.failures.len(),
        report.ignored.len()
    ));
    log.write_entry(&done);
    log.flush();
    Ok(report)
}

/// Table names ignore case, so `jan.csv` and `JAN.csv` would land in the same
/// table. The first file in scan order keeps the name; the rest are rejected.
fn split_name_collisions(files: Vec<PathBuf>) -> (Vec<PathBuf>, Vec<(PathBuf, KstError)>) {
    let mut owners: HashMap<String, PathBuf> = HashMap::new();
    let mut kept = Vec::with_capacity(files.len());
    let mut rejected = Vec::new();
    for path in files {
        let Some(name) = snapshot_name(&path) else {
            kept.push(path);
            continue;
        };
        match owners.get(&name.to_ascii_lowercase()) {
            Some(owner) => {
                let err = KstError::ingest(
                    &path,
                    format!(
                        "snapshot name {name:?} collides with {} (names ignore case)",
                        owner.display()
                    ),
                );
                rejected.push((path, err));
            }
            None => {
                owners.insert(name.to_ascii_lowercase(), path.clone());
                kept.push(path);
            }
        }
    }
    (kept, rejected)
}

fn ingest_incremental(
    files: &[PathBuf],
    store: &mut SnapshotStore,
    opts: &IngestOptions,
    log: &mut JsonlWriter,
    report: &mut IngestReport,
) {
    for path in files {
        let outcome = parse_snapshot_file(path, &opts.separators).and_then(|parsed| {
            store
                .replace_snapshot(&parsed.name, &parsed.table)
                .map_err(|e| KstError::ingest(path, e.to_string()))?;
            Ok(parsed.summary())
        });
        match outcome {
            Ok(loaded) => {
                log.write_entry(&loaded_entry(&loaded));
                report.loaded.push(loaded);
            }
            Err(e) => {
                log.write_entry(&LogEntry::failure(EventType::SnapshotFailed, &e).with_path(path));
                report.failures.push(IngestFailure::new(path, &e));
            }
        }
    }
}

fn ingest_atomic(
    files: &[PathBuf],
    store: &mut SnapshotStore,
    opts: &IngestOptions,
    log: &mut JsonlWriter,
    report: &mut IngestReport,
) -> Result<()> {
    let mut parsed = Vec::with_capacity(files.len());
    for path in files {
        match parse_snapshot_file(path, &opts.separators) {
            Ok(p) => parsed.push(p),
            Err(e) => {
                log.write_entry(&LogEntry::failure(EventType::SnapshotFailed, &e).with_path(path));
                return Err(e);
            }
        }
    }

    store.replace_many(parsed.iter().map(|p| (p.name.as_str(), &p.table)))?;
    for p in &parsed {
        let loaded = p.summary();
        log.write_entry(&loaded_entry(&loaded));
        report.loaded.push(loaded);
    }
    Ok(())
}

fn loaded_entry(loaded: &LoadedSnapshot) -> LogEntry {
    let mut entry = LogEntry::new(EventType::SnapshotLoaded, Severity::Info)
        .with_snapshot(&loaded.name)
        .with_path(&loaded.path);
    entry.rows = Some(loaded.rows as u64);
    entry.columns = Some(loaded.columns.len() as u64);
    entry.fingerprint = Some(loaded.fingerprint.clone());
    entry.ok = Some(true);
    entry
}

fn first_duplicate(columns: &[String]) -> Option<&str> {
    let mut seen = std::collections::HashSet::new();
    columns
        .iter()
        .find(|c| !seen.insert(c.to_ascii_lowercase()))
        .map(String::as_str)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest
        .iter()
        .fold(String::with_capacity(digest.len() * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
}
