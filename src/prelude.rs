//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use kingdom_stats_tracker::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{KstError, PipelineStage, Result};
pub use crate::core::messages::Language;

// Store
pub use crate::store::sqlite::SnapshotStore;
pub use crate::store::table::Table;
pub use crate::store::value::Value;

// Ingestion
pub use crate::ingest::pipeline::{IngestOptions, IngestReport, ingest_directory};

// Analysis
pub use crate::analysis::aggregate::{Dataset, LongRecord, aggregate, aggregate_tables};
pub use crate::analysis::filter::RowFilter;
pub use crate::analysis::metrics::{
    DataWarning, MetricOptions, PivotKind, PivotTable, Trend, TrendPoint, delta_pivot, pivot,
    trend,
};
pub use crate::analysis::selector::EntityChoice;

// Facade
pub use crate::tracker::{RunSummary, Tracker};
