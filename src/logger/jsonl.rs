//! JSONL activity log: one self-contained JSON object per line.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! reader tailing the file never sees a partial line.
//!
//! Fallback chain:
//! 1. Primary file path
//! 2. Fallback path (a file in the system temp directory by default)
//! 3. stderr with `[KST-JSONL]` prefix
//! 4. Silent discard (a logging failure never fails a pipeline run)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{KstError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Activity-log event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    IngestStart,
    SnapshotLoaded,
    SnapshotFailed,
    IngestComplete,
    DataWarning,
    ReferenceDegraded,
    Error,
}

/// A single JSONL log entry. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Snapshot (table) name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
    /// Source file or directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<u64>,
    /// SHA-256 of the source bytes, hex encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// KST error code if the action failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Hash of the effective configuration, for correlating runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            snapshot: None,
            path: None,
            rows: None,
            columns: None,
            fingerprint: None,
            duration_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
            config_hash: None,
            details: None,
        }
    }

    /// Entry describing a failure.
    pub fn failure(event: EventType, err: &KstError) -> Self {
        let mut entry = Self::new(event, Severity::Warning);
        entry.ok = Some(false);
        entry.error_code = Some(err.root().code().to_string());
        entry.error_message = Some(err.to_string());
        entry
    }

    #[must_use]
    pub fn with_snapshot(mut self, name: impl Into<String>) -> Self {
        self.snapshot = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// File size that triggers rotation. Default: 10 MiB.
    pub max_size_bytes: u64,
    /// Rotated generations kept next to the live file. Default: 3.
    pub max_rotated_files: u32,
}

impl JsonlConfig {
    /// Defaults around a primary path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("kst-activity.jsonl"),
            fallback_path: Some(std::env::temp_dir().join("kst-activity.jsonl")),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

/// Which configured file a sink writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Primary,
    Fallback,
}

/// Where the next line goes. Each failure moves one step down the chain.
enum Sink {
    File {
        target: Target,
        out: BufWriter<File>,
        size: u64,
    },
    Stderr,
    Discard,
}

/// Append-only JSONL log writer with rotation and multi-level fallback.
pub struct JsonlWriter {
    config: JsonlConfig,
    sink: Sink,
    bytes_written: u64,
}

impl JsonlWriter {
    /// Open the log file, falling through the degradation chain on failure.
    pub fn open(config: JsonlConfig) -> Self {
        let mut w = Self {
            config,
            sink: Sink::Discard,
            bytes_written: 0,
        };
        w.sink = w.first_available(Target::Primary);
        w
    }

    /// Writer that drops everything. Used when logging is disabled.
    pub fn disabled() -> Self {
        Self {
            config: JsonlConfig {
                fallback_path: None,
                ..JsonlConfig::default()
            },
            sink: Sink::Discard,
            bytes_written: 0,
        }
    }

    /// Write a single log entry as one JSONL line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(mut line) => {
                line.push('\n');
                self.write_line(&line);
            }
            Err(e) => {
                let _ = writeln!(io::stderr(), "[KST-JSONL] serialize error: {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Sink::File { out, .. } = &mut self.sink {
            let _ = out.flush();
        }
    }

    /// Current degradation state: `normal`, `fallback`, `stderr` or `discard`.
    pub fn state(&self) -> &'static str {
        match &self.sink {
            Sink::File {
                target: Target::Primary,
                ..
            } => "normal",
            Sink::File {
                target: Target::Fallback,
                ..
            } => "fallback",
            Sink::Stderr => "stderr",
            Sink::Discard => "discard",
        }
    }

    /// Bytes this writer appended to log files.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    // ──────────────────────── internals ────────────────────────

    fn path_for(&self, target: Target) -> Option<&Path> {
        match target {
            Target::Primary => Some(&self.config.path),
            Target::Fallback => self.config.fallback_path.as_deref(),
        }
    }

    /// Open `target`, or the next link of the chain when that fails.
    fn first_available(&self, target: Target) -> Sink {
        let mut candidate = Some(target);
        while let Some(t) = candidate {
            if let Some(path) = self.path_for(t)
                && let Ok((file, size)) = open_append(path)
            {
                if t == Target::Fallback {
                    let _ = writeln!(
                        io::stderr(),
                        "[KST-JSONL] primary log unavailable, writing to {}",
                        path.display()
                    );
                }
                return Sink::File {
                    target: t,
                    out: BufWriter::new(file),
                    size,
                };
            }
            candidate = (t == Target::Primary).then_some(Target::Fallback);
        }
        let _ = writeln!(io::stderr(), "[KST-JSONL] no log file available, using stderr");
        Sink::Stderr
    }

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        loop {
            let needs_rotation = matches!(
                &self.sink,
                Sink::File { size, .. } if size + len > self.config.max_size_bytes
            );
            if needs_rotation {
                self.rotate();
            }
            match &mut self.sink {
                Sink::File { out, size, .. } => {
                    if out.write_all(line.as_bytes()).is_ok() {
                        *size += len;
                        self.bytes_written += len;
                        return;
                    }
                    self.degrade();
                }
                Sink::Stderr => {
                    if write!(io::stderr(), "[KST-JSONL] {line}").is_err() {
                        self.sink = Sink::Discard;
                    }
                    return;
                }
                Sink::Discard => return,
            }
        }
    }

    /// Drop the current sink and move one step down the chain.
    fn degrade(&mut self) {
        self.sink = match std::mem::replace(&mut self.sink, Sink::Discard) {
            Sink::File {
                target: Target::Primary,
                ..
            } => self.first_available(Target::Fallback),
            Sink::File {
                target: Target::Fallback,
                ..
            } => Sink::Stderr,
            Sink::Stderr | Sink::Discard => Sink::Discard,
        };
    }

    /// Shift `log.N` to `log.N+1`, move the live file to `log.1` and reopen.
    fn rotate(&mut self) {
        let target = match std::mem::replace(&mut self.sink, Sink::Discard) {
            Sink::File { target, out, .. } => {
                drop(out);
                target
            }
            other => {
                self.sink = other;
                return;
            }
        };
        let Some(base) = self.path_for(target).map(Path::to_path_buf) else {
            return;
        };

        for i in (1..self.config.max_rotated_files).rev() {
            let _ = rename(rotated_name(&base, i), rotated_name(&base, i + 1));
        }
        let _ = rename(&base, rotated_name(&base, 1));

        self.sink = match open_append(&base) {
            Ok((file, size)) => Sink::File {
                target,
                out: BufWriter::new(file),
                size,
            },
            Err(_) => match target {
                Target::Primary => self.first_available(Target::Fallback),
                Target::Fallback => Sink::Stderr,
            },
        };
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

// ──────────────────────── helpers ────────────────────────

/// Open or create a file for appending, creating parent directories.
/// Returns the file and its current length.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| KstError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| KstError::io(path, source))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok((file, size))
}

/// `kst-activity.jsonl` → `kst-activity.jsonl.2`.
fn rotated_name(base: &Path, generation: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
