//! Aggregation and metrics over stored snapshots.

pub mod aggregate;
pub mod dates;
pub mod filter;
pub mod metrics;
pub mod reference;
pub mod selector;
