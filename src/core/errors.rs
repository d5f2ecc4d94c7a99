//! KST-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, KstError>;

/// Pipeline stage a failure is attributed to in user-facing reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Config,
    Ingest,
    List,
    Read,
    Aggregate,
    Metrics,
}

impl PipelineStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Ingest => "ingest",
            Self::List => "list",
            Self::Read => "read",
            Self::Aggregate => "aggregate",
            Self::Metrics => "metrics",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for the stats tracker.
#[derive(Debug, Error)]
pub enum KstError {
    #[error("[KST-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[KST-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[KST-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[KST-2001] ingestion failed for {path}: {details}")]
    Ingest { path: PathBuf, details: String },

    #[error("[KST-2002] snapshot directory not found: {path}")]
    MissingInputDir { path: PathBuf },

    #[error("[KST-2101] snapshot not found: {name}")]
    SnapshotNotFound { name: String },

    #[error("[KST-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[KST-2103] invalid query: {details}")]
    InvalidQuery { details: String },

    #[error("[KST-2201] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[KST-2202] CSV failure: {details}")]
    Csv { details: String },

    #[error("[KST-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[KST-3900] runtime failure: {details}")]
    Runtime { details: String },

    #[error("[KST-3901] {stage} stage failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: Box<KstError>,
    },
}

impl KstError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "KST-1001",
            Self::MissingConfig { .. } => "KST-1002",
            Self::ConfigParse { .. } => "KST-1003",
            Self::Ingest { .. } => "KST-2001",
            Self::MissingInputDir { .. } => "KST-2002",
            Self::SnapshotNotFound { .. } => "KST-2101",
            Self::Sql { .. } => "KST-2102",
            Self::InvalidQuery { .. } => "KST-2103",
            Self::Serialization { .. } => "KST-2201",
            Self::Csv { .. } => "KST-2202",
            Self::Io { .. } => "KST-3001",
            Self::Runtime { .. } => "KST-3900",
            Self::Stage { .. } => "KST-3901",
        }
    }

    /// Whether the failure comes from bad input rather than the environment.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        match self {
            Self::InvalidConfig { .. }
            | Self::MissingConfig { .. }
            | Self::ConfigParse { .. }
            | Self::MissingInputDir { .. }
            | Self::SnapshotNotFound { .. }
            | Self::InvalidQuery { .. } => true,
            Self::Stage { source, .. } => source.is_user_error(),
            _ => false,
        }
    }

    /// Stage the failure was tagged with, if any.
    #[must_use]
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, skipping stage wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Tag this error with the stage that produced it. Already-tagged errors keep
    /// their original stage.
    #[must_use]
    pub fn at_stage(self, stage: PipelineStage) -> Self {
        match self {
            tagged @ Self::Stage { .. } => tagged,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for per-file ingestion failures.
    #[must_use]
    pub fn ingest(path: impl AsRef<Path>, details: impl Into<String>) -> Self {
        Self::Ingest {
            path: path.as_ref().to_path_buf(),
            details: details.into(),
        }
    }
}

/// Extension for tagging `Result`s with a pipeline stage.
pub trait StageExt<T> {
    fn stage(self, stage: PipelineStage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: PipelineStage) -> Result<T> {
        self.map_err(|e| e.at_stage(stage))
    }
}

impl From<rusqlite::Error> for KstError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<csv::Error> for KstError {
    fn from(value: csv::Error) -> Self {
        Self::Csv {
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for KstError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for KstError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<KstError> {
        vec![
            KstError::InvalidConfig {
                details: String::new(),
            },
            KstError::MissingConfig {
                path: PathBuf::new(),
            },
            KstError::ConfigParse {
                context: "",
                details: String::new(),
            },
            KstError::Ingest {
                path: PathBuf::new(),
                details: String::new(),
            },
            KstError::MissingInputDir {
                path: PathBuf::new(),
            },
            KstError::SnapshotNotFound {
                name: String::new(),
            },
            KstError::Sql {
                context: "",
                details: String::new(),
            },
            KstError::InvalidQuery {
                details: String::new(),
            },
            KstError::Serialization {
                context: "",
                details: String::new(),
            },
            KstError::Csv {
                details: String::new(),
            },
            KstError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            KstError::Runtime {
                details: String::new(),
            },
            KstError::Runtime {
                details: String::new(),
            }
            .at_stage(PipelineStage::Ingest),
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let codes: Vec<&str> = all_variants().iter().map(KstError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_kst_prefix() {
        for err in &all_variants() {
            assert!(
                err.code().starts_with("KST-"),
                "code {} must start with KST-",
                err.code()
            );
        }
    }

    #[test]
    fn error_display_includes_code() {
        let err = KstError::SnapshotNotFound {
            name: "01012024".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("KST-2101"), "display should contain code: {msg}");
        assert!(msg.contains("01012024"), "display should contain name: {msg}");
    }

    #[test]
    fn stage_tagging_keeps_first_stage_and_root() {
        let err = KstError::SnapshotNotFound {
            name: "x".to_string(),
        }
        .at_stage(PipelineStage::Aggregate)
        .at_stage(PipelineStage::Metrics);
        assert_eq!(err.stage(), Some(PipelineStage::Aggregate));
        assert_eq!(err.root().code(), "KST-2101");
        assert!(err.is_user_error());
        assert!(err.to_string().contains("aggregate stage failed"));
    }

    #[test]
    fn stage_ext_tags_results() {
        let res: Result<()> = Err(KstError::Runtime {
            details: "boom".to_string(),
        });
        let err = res.stage(PipelineStage::List).unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::List));
        assert!(!err.is_user_error());
    }

    #[test]
    fn io_convenience_constructor() {
        let err = KstError::io(
            "/tmp/test.csv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "KST-3001");
        assert!(err.to_string().contains("/tmp/test.csv"));
    }

    #[test]
    fn from_rusqlite_error() {
        let sql_err =
            rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(1), Some("test".to_string()));
        let err: KstError = sql_err.into();
        assert_eq!(err.code(), "KST-2102");
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: KstError = json_err.into();
        assert_eq!(err.code(), "KST-2201");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: KstError = toml_err.into();
        assert_eq!(err.code(), "KST-1003");
    }
}
