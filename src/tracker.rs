//! Library entry point: configuration, store access, dataset cache and
//! stage-tagged failures behind one handle.
//!
//! Every operation opens the SQLite store, uses it and drops it before
//! returning. The aggregated dataset is cached and reused while the store's
//! snapshot-name set stays the same. An ingestion made through the tracker
//! always drops the cache.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Serialize;

use crate::analysis::aggregate::{Dataset, aggregate};
use crate::analysis::dates::sort_chronologically;
use crate::analysis::filter::{RowFilter, apply_filters};
use crate::analysis::metrics::{
    DataWarning, MetricOptions, PivotTable, Trend, delta_pivot, pivot, trend,
};
use crate::analysis::reference::ReferenceNotes;
use crate::analysis::selector::{EntityChoice, entities_in_dataset, entities_in_table};
use crate::core::config::Config;
use crate::core::errors::{PipelineStage, Result, StageExt};
use crate::ingest::pipeline::{IngestOptions, IngestReport, ingest_directory};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use crate::store::sqlite::SnapshotStore;
use crate::store::table::Table;

struct CachedDataset {
    /// Sorted snapshot names the dataset was built from.
    key: Vec<String>,
    dataset: Arc<Dataset>,
}

/// Summary of a full ingest → aggregate → metrics pass.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub ingest: IngestReport,
    pub snapshots: Vec<String>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub entities: usize,
    /// One delta table per configured trend metric.
    pub deltas: Vec<PivotTable>,
}

/// Stats tracker facade.
pub struct Tracker {
    config: Config,
    options: MetricOptions,
    log: Mutex<JsonlWriter>,
    cache: Mutex<Option<CachedDataset>>,
}

impl Tracker {
    /// Tracker writing its activity log to `config.paths.jsonl_log`.
    pub fn new(config: Config) -> Self {
        let log = JsonlWriter::open(JsonlConfig::at(&config.paths.jsonl_log));
        Self::with_log(config, log)
    }

    /// Tracker with an explicit log writer.
    pub fn with_log(config: Config, log: JsonlWriter) -> Self {
        let options = MetricOptions::from_config(&config);
        Self {
            config,
            options,
            log: Mutex::new(log),
            cache: Mutex::new(None),
        }
    }

    /// Load configuration from `path` (or the default location) and build a tracker.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Config::load(path).stage(PipelineStage::Config)?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metric_options(&self) -> &MetricOptions {
        &self.options
    }

    fn open_store(&self) -> Result<SnapshotStore> {
        SnapshotStore::open(&self.config.paths.sqlite_db)
    }

    // ──────────────────── ingestion ────────────────────

    /// Ingest `paths.data_dir` into the store.
    pub fn ingest(&self) -> Result<IngestReport> {
        self.ingest_from(&self.config.paths.data_dir)
    }

    /// Ingest an explicit directory into the store.
    pub fn ingest_from(&self, dir: &Path) -> Result<IngestReport> {
        let result = (|| {
            let mut store = self.open_store()?;
            let opts = IngestOptions::from_config(&self.config);
            let mut log = self.log.lock();
            ingest_directory(dir, &mut store, &opts, &mut log)
        })();
        *self.cache.lock() = None;
        self.logged(result.stage(PipelineStage::Ingest))
    }

    // ──────────────────── reads ────────────────────

    /// Snapshot names in store order (sorted by name).
    pub fn list_snapshot_names(&self) -> Result<Vec<String>> {
        let result = self
            .open_store()
            .and_then(|store| store.list_snapshot_names())
            .stage(PipelineStage::List);
        self.logged(result)
    }

    /// Snapshot names ordered by their encoded date, undated names last.
    pub fn snapshot_names_chronological(&self) -> Result<Vec<String>> {
        let mut names = self.list_snapshot_names()?;
        sort_chronologically(&mut names);
        Ok(names)
    }

    pub fn read_snapshot(&self, name: &str) -> Result<Table> {
        let result = self
            .open_store()
            .and_then(|store| store.read_snapshot(name))
            .stage(PipelineStage::Read);
        self.logged(result)
    }

    /// One snapshot restricted to the rows passing every filter.
    pub fn read_filtered(&self, name: &str, filters: &[RowFilter]) -> Result<Table> {
        let table = self.read_snapshot(name)?;
        let result = apply_filters(&table, filters, &self.options.separators)
            .stage(PipelineStage::Read);
        self.logged(result)
    }

    /// All snapshots as one long-form dataset, in chronological snapshot order.
    pub fn aggregated(&self) -> Result<Arc<Dataset>> {
        let names = self.list_snapshot_names()?;
        let result = self.aggregate_names(names).stage(PipelineStage::Aggregate);
        self.logged(result)
    }

    fn aggregate_names(&self, names: Vec<String>) -> Result<Arc<Dataset>> {
        let mut key = names;
        key.sort();
        if let Some(cached) = self.cache.lock().as_ref()
            && cached.key == key
        {
            return Ok(Arc::clone(&cached.dataset));
        }

        let mut ordered = key.clone();
        sort_chronologically(&mut ordered);
        let store = self.open_store()?;
        let dataset = Arc::new(aggregate(&store, &ordered)?);
        drop(store);

        *self.cache.lock() = Some(CachedDataset {
            key,
            dataset: Arc::clone(&dataset),
        });
        Ok(dataset)
    }

    // ──────────────────── metrics ────────────────────

    /// Time series of `metric` for one entity.
    pub fn trend(&self, entity: &str, metric: &str) -> Result<Trend> {
        let dataset = self.aggregated()?;
        let result = trend(&dataset, entity, metric, &self.options);
        self.log_warnings(metric, &result.warnings);
        Ok(result)
    }

    /// Trends for several metrics of the same entity.
    pub fn trends(&self, entity: &str, metrics: &[String]) -> Result<Vec<Trend>> {
        let dataset = self.aggregated()?;
        Ok(metrics
            .iter()
            .map(|metric| {
                let result = trend(&dataset, entity, metric, &self.options);
                self.log_warnings(metric, &result.warnings);
                result
            })
            .collect())
    }

    /// Raw per-entity, per-date values of `metric`.
    pub fn pivot(&self, metric: &str) -> Result<PivotTable> {
        let dataset = self.aggregated()?;
        let table = pivot(&dataset, metric, &self.options);
        self.log_warnings(metric, &table.warnings);
        Ok(table)
    }

    /// Period-over-period change of `metric` per entity.
    pub fn delta_pivot(&self, metric: &str) -> Result<PivotTable> {
        let dataset = self.aggregated()?;
        let table = delta_pivot(&dataset, metric, &self.options);
        self.log_warnings(metric, &table.warnings);
        Ok(table)
    }

    /// Entities in one snapshot, or across all snapshots when `snapshot` is `None`.
    pub fn entity_selector(&self, snapshot: Option<&str>) -> Result<Vec<EntityChoice>> {
        let (id, name) = (&self.options.id_column, &self.options.name_column);
        match snapshot {
            Some(snapshot) => {
                let table = self.read_snapshot(snapshot)?;
                Ok(entities_in_table(&table, id, name))
            }
            None => {
                let dataset = self.aggregated()?;
                Ok(entities_in_dataset(&dataset, id, name))
            }
        }
    }

    /// Notes from `paths.reference_file`. Problems are logged, never raised.
    pub fn reference_notes(&self) -> ReferenceNotes {
        let Some(path) = &self.config.paths.reference_file else {
            return ReferenceNotes::default();
        };
        let load = ReferenceNotes::load(path);
        if !load.problems.is_empty() {
            let mut log = self.log.lock();
            for problem in &load.problems {
                log.write_entry(
                    &LogEntry::new(EventType::ReferenceDegraded, Severity::Warning)
                        .with_path(path)
                        .with_details(problem.clone()),
                );
            }
            log.flush();
        }
        load.notes
    }

    /// Column labels for a pivot, annotated with reference notes.
    pub fn column_labels(&self, table: &PivotTable) -> Vec<String> {
        let notes = self.reference_notes();
        table.labels(&self.config.metrics.label_format, Some(&notes))
    }

    // ──────────────────── full pass ────────────────────

    /// Ingest, list, aggregate, then compute the delta table of every
    /// configured trend metric. The first failure is returned tagged with the
    /// stage that produced it.
    pub fn run_full(&self) -> Result<RunSummary> {
        let ingest = self.ingest()?;
        let snapshots = self.snapshot_names_chronological()?;
        let dataset = self.aggregated()?;

        let mut deltas = Vec::with_capacity(self.config.metrics.trend_metrics.len());
        for metric in &self.config.metrics.trend_metrics {
            deltas.push(self.delta_pivot(metric)?);
        }
        let entities = dataset
            .column_index(&self.options.id_column)
            .map_or(0, |idx| {
                dataset
                    .records
                    .iter()
                    .filter_map(|r| r.values[idx].key())
                    .collect::<std::collections::HashSet<_>>()
                    .len()
            });

        Ok(RunSummary {
            ingest,
            snapshots,
            rows: dataset.len(),
            columns: dataset.columns.clone(),
            dates: dataset.dates(),
            entities,
            deltas,
        })
    }

    // ──────────────────── logging ────────────────────

    fn log_warnings(&self, metric: &str, warnings: &[DataWarning]) {
        if warnings.is_empty() {
            return;
        }
        let mut log = self.log.lock();
        for warning in warnings {
            log.write_entry(
                &LogEntry::new(EventType::DataWarning, Severity::Warning)
                    .with_details(format!("{metric}: {warning}")),
            );
        }
        log.flush();
    }

    fn logged<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            let mut entry = LogEntry::failure(EventType::Error, err);
            entry.details = err.stage().map(|s| s.as_str().to_string());
            let mut log = self.log.lock();
            log.write_entry(&entry);
            log.flush();
        }
        result
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("sqlite_db", &self.config.paths.sqlite_db)
            .field("data_dir", &self.config.paths.data_dir)
            .finish_non_exhaustive()
    }
}
