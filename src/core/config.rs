//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{KstError, Result};
use crate::core::messages::Language;
use crate::core::paths::resolve_absolute_path;

/// Full tracker configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub ingest: IngestConfig,
    pub metrics: MetricsConfig,
    pub display: DisplayConfig,
}

/// Filesystem locations for inputs, the snapshot store, and the activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// Directory scanned for `MMDDYYYY.csv` snapshot files.
    pub data_dir: PathBuf,
    pub sqlite_db: PathBuf,
    pub jsonl_log: PathBuf,
    /// Optional `date,location,reason` CSV used to annotate delta columns.
    pub reference_file: Option<PathBuf>,
}

/// Snapshot ingestion behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    /// File extension (without the dot) that marks a snapshot file.
    pub extension: String,
    /// Characters stripped before integer coercion.
    pub thousands_separators: Vec<char>,
    /// Parse every file before writing any, then commit all in one transaction.
    pub atomic: bool,
}

/// Entity columns and derived-metric presentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    pub id_column: String,
    pub name_column: String,
    /// Metrics reported when a trend is requested without an explicit metric.
    pub trend_metrics: Vec<String>,
    /// `chrono` format used for delta-table column labels.
    pub label_format: String,
}

/// User-facing output preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    pub language: Language,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[KST-CONFIG] WARNING: HOME not set, falling back to /tmp for config paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("kst").join("config.toml");
        Self {
            config_file: cfg,
            data_dir: PathBuf::from("data"),
            sqlite_db: PathBuf::from("ingested_data.db"),
            jsonl_log: PathBuf::from("kst-activity.jsonl"),
            reference_file: None,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extension: "csv".to_string(),
            thousands_separators: vec![','],
            atomic: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            id_column: "governorID".to_string(),
            name_column: "name".to_string(),
            trend_metrics: vec![
                "power".to_string(),
                "killpoints".to_string(),
                "deads".to_string(),
            ],
            label_format: "%m/%d".to_string(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            language: Language::En,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Configuration rooted at one working directory, for tests and embedding.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        let mut cfg = Self::default();
        cfg.paths.config_file = root.join("kst.toml");
        cfg.paths.data_dir = root.join("data");
        cfg.paths.sqlite_db = root.join("ingested_data.db");
        cfg.paths.jsonl_log = root.join("kst-activity.jsonl");
        cfg
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| KstError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(KstError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for log correlation (FNV-1a).
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("KST_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("KST_SQLITE_DB") {
            self.paths.sqlite_db = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("KST_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("KST_REFERENCE_FILE") {
            self.paths.reference_file = Some(PathBuf::from(raw));
        }

        if let Some(raw) = lookup("KST_INGEST_ATOMIC") {
            self.ingest.atomic = parse_env_bool("KST_INGEST_ATOMIC", &raw)?;
        }
        if let Some(raw) = lookup("KST_INGEST_EXTENSION") {
            self.ingest.extension = raw;
        }

        if let Some(raw) = lookup("KST_ID_COLUMN") {
            self.metrics.id_column = raw;
        }
        if let Some(raw) = lookup("KST_NAME_COLUMN") {
            self.metrics.name_column = raw;
        }

        if let Some(raw) = lookup("KST_LANGUAGE") {
            self.display.language =
                raw.parse::<Language>()
                    .map_err(|details| KstError::ConfigParse {
                        context: "env",
                        details: format!("KST_LANGUAGE={raw:?}: {details}"),
                    })?;
        }

        Ok(())
    }

    /// Resolve relative paths against the working directory and tidy the extension.
    fn normalize_paths(&mut self) {
        self.paths.data_dir = resolve_absolute_path(&self.paths.data_dir);
        self.paths.sqlite_db = resolve_absolute_path(&self.paths.sqlite_db);
        self.paths.jsonl_log = resolve_absolute_path(&self.paths.jsonl_log);
        if let Some(reference) = self.paths.reference_file.as_mut() {
            *reference = resolve_absolute_path(reference);
        }

        let trimmed = self.ingest.extension.trim().trim_start_matches('.');
        self.ingest.extension = trimmed.to_ascii_lowercase();
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.extension.is_empty() || self.ingest.extension.contains('.') {
            return Err(KstError::InvalidConfig {
                details: format!(
                    "ingest.extension must be a bare extension like \"csv\", got {:?}",
                    self.ingest.extension
                ),
            });
        }

        if self.ingest.thousands_separators.is_empty() {
            return Err(KstError::InvalidConfig {
                details: "ingest.thousands_separators must not be empty".to_string(),
            });
        }
        if let Some(bad) = self
            .ingest
            .thousands_separators
            .iter()
            .find(|c| c.is_ascii_digit() || **c == '-' || **c == '+')
        {
            return Err(KstError::InvalidConfig {
                details: format!("ingest.thousands_separators cannot contain {bad:?}"),
            });
        }

        for (name, val) in [
            ("id_column", &self.metrics.id_column),
            ("name_column", &self.metrics.name_column),
        ] {
            if val.trim().is_empty() {
                return Err(KstError::InvalidConfig {
                    details: format!("metrics.{name} must not be empty"),
                });
            }
        }
        if self.metrics.id_column == self.metrics.name_column {
            return Err(KstError::InvalidConfig {
                details: "metrics.id_column and metrics.name_column must differ".to_string(),
            });
        }

        if self.metrics.trend_metrics.iter().any(|m| m.trim().is_empty()) {
            return Err(KstError::InvalidConfig {
                details: "metrics.trend_metrics must not contain empty names".to_string(),
            });
        }

        crate::analysis::dates::validate_label_format(&self.metrics.label_format)?;

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.trim()
        .parse::<bool>()
        .map_err(|error| KstError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

#[cfg(test)]
mod tests {
    use super::{Config, KstError, Language};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn defaults_match_tracker_columns() {
        let cfg = Config::default();
        assert_eq!(cfg.metrics.id_column, "governorID");
        assert_eq!(cfg.metrics.name_column, "name");
        assert_eq!(
            cfg.metrics.trend_metrics,
            vec!["power", "killpoints", "deads"]
        );
        assert_eq!(cfg.ingest.extension, "csv");
        assert!(!cfg.ingest.atomic);
    }

    #[test]
    fn stable_hash_changes_when_config_changes() {
        let cfg = Config::default();
        let hash_before = cfg.stable_hash().expect("hash should compute");
        let mut modified = Config::default();
        modified.ingest.atomic = true;
        let hash_after = modified.stable_hash().expect("hash should compute");
        assert_ne!(hash_before, hash_after);
    }

    #[test]
    fn stable_hash_deterministic() {
        let cfg = Config::default();
        assert_eq!(cfg.stable_hash().unwrap(), cfg.stable_hash().unwrap());
    }

    #[test]
    fn empty_extension_rejected() {
        let mut cfg = Config::default();
        cfg.ingest.extension = String::new();
        let err = cfg.validate().expect_err("expected extension error");
        assert!(err.to_string().contains("ingest.extension"));
    }

    #[test]
    fn digit_separator_rejected() {
        let mut cfg = Config::default();
        cfg.ingest.thousands_separators = vec!['0'];
        let err = cfg.validate().expect_err("expected separator error");
        assert!(err.to_string().contains("thousands_separators"));
    }

    #[test]
    fn identical_id_and_name_columns_rejected() {
        let mut cfg = Config::default();
        cfg.metrics.name_column = cfg.metrics.id_column.clone();
        let err = cfg.validate().expect_err("expected column error");
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn bad_label_format_rejected() {
        let mut cfg = Config::default();
        cfg.metrics.label_format = "%Q".to_string();
        let err = cfg.validate().expect_err("expected label format error");
        assert!(matches!(err, KstError::InvalidConfig { .. }));
    }

    #[test]
    fn time_label_format_rejected() {
        let mut cfg = Config::default();
        cfg.metrics.label_format = "%H:%M".to_string();
        let err = cfg.validate().expect_err("time fields cannot render on a date");
        assert!(err.to_string().contains("label_format"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        let overrides = vars(&[
            ("KST_DATA_DIR", "/srv/kingdom/data"),
            ("KST_INGEST_ATOMIC", "true"),
            ("KST_ID_COLUMN", "player_id"),
            ("KST_LANGUAGE", "es"),
            ("KST_REFERENCE_FILE", "/srv/kingdom/notes.csv"),
        ]);
        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect("env overrides should parse");

        assert_eq!(cfg.paths.data_dir, PathBuf::from("/srv/kingdom/data"));
        assert!(cfg.ingest.atomic);
        assert_eq!(cfg.metrics.id_column, "player_id");
        assert_eq!(cfg.display.language, Language::Es);
        assert_eq!(
            cfg.paths.reference_file,
            Some(PathBuf::from("/srv/kingdom/notes.csv"))
        );
    }

    #[test]
    fn env_invalid_boolean_rejected() {
        let mut cfg = Config::default();
        let overrides = vars(&[("KST_INGEST_ATOMIC", "sometimes")]);
        let err = cfg
            .apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect_err("invalid bool should fail");
        match err {
            KstError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("KST_INGEST_ATOMIC"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn env_unknown_language_rejected() {
        let mut cfg = Config::default();
        let overrides = vars(&[("KST_LANGUAGE", "fr")]);
        assert!(
            cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
                .is_err()
        );
    }

    #[test]
    fn normalize_strips_dot_and_case_from_extension() {
        let mut cfg = Config::default();
        cfg.ingest.extension = ".CSV".to_string();
        cfg.normalize_paths();
        assert_eq!(cfg.ingest.extension, "csv");
        assert!(cfg.paths.data_dir.is_absolute());
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/nonexistent/kst/config.toml")));
        assert!(matches!(result, Err(KstError::MissingConfig { .. })));
    }

    #[test]
    fn load_reads_toml_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kst.toml");
        std::fs::write(
            &path,
            "[ingest]\natomic = true\n\n[metrics]\nid_column = \"pid\"\ntrend_metrics = [\"kills\"]\n",
        )
        .unwrap();

        let cfg = Config::load(Some(&path)).expect("config should load");
        assert!(cfg.ingest.atomic);
        assert_eq!(cfg.metrics.id_column, "pid");
        assert_eq!(cfg.metrics.name_column, "name");
        assert_eq!(cfg.metrics.trend_metrics, vec!["kills"]);
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn rooted_config_places_everything_under_root() {
        let root = Path::new("/tmp/kst-root");
        let cfg = Config::rooted_at(root);
        assert!(cfg.paths.data_dir.starts_with(root));
        assert!(cfg.paths.sqlite_db.starts_with(root));
        assert!(cfg.paths.jsonl_log.starts_with(root));
    }
}
