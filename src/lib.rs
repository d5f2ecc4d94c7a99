#![forbid(unsafe_code)]

//! Kingdom Stats Tracker (kst): ingests dated CSV snapshots of clan player
//! statistics into SQLite and derives per-player trends.
//!
//! Pipeline:
//! 1. **Ingestion**: a folder of `MMDDYYYY.csv` files becomes one SQLite table per file
//! 2. **Aggregation**: all tables concatenated into a date-tagged long-form dataset
//! 3. **Metrics**: single-player trends and cross-player delta pivots
//!
//! # Library usage
//!
//! ```rust,no_run
//! use kingdom_stats_tracker::prelude::*;
//!
//! let tracker = Tracker::load(None)?;
//! tracker.ingest()?;
//! let trend = tracker.trend("12345", "power")?;
//! # Ok::<(), KstError>(())
//! ```

pub mod prelude;

pub mod analysis;
pub mod core;
pub mod ingest;
pub mod logger;
pub mod store;
pub mod tracker;
