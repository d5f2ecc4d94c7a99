//! Snapshot store: tagged values, in-memory tables, and the SQLite backing file.

pub mod sqlite;
pub mod table;
pub mod value;
