//! Snapshot ingestion: scan, parse, coerce, store.

pub mod coerce;
pub mod pipeline;
