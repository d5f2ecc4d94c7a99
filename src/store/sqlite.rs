//! SQLite snapshot store: one table per ingested snapshot, replace-on-ingest.
//!
//! Table names come from user-controlled filenames, so every identifier is
//! quoted through [`quote_ident`] and existence checks use bound parameters.
//! The connection is owned by the store and released when it is dropped, which
//! covers every early-return and error path.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, params, params_from_iter};

use crate::core::errors::{KstError, Result};
use crate::store::table::Table;
use crate::store::value::Value;

/// Handle to the snapshot database file.
pub struct SnapshotStore {
    conn: Connection,
    path: PathBuf,
}

impl SnapshotStore {
    /// Open (or create) the database at `path` and apply PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| KstError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// In-memory store, used by tests that do not care about persistence.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ──────────────────── reads ────────────────────

    /// Names of all snapshot tables, sorted by name.
    pub fn list_snapshot_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
             ORDER BY name ASC",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Whether a snapshot table called `name` exists. SQLite resolves table
    /// names ignoring ASCII case, and so does this lookup.
    pub fn contains(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Read a whole snapshot table, preserving column and row order.
    pub fn read_snapshot(&self, name: &str) -> Result<Table> {
        if !self.contains(name)? {
            return Err(KstError::SnapshotNotFound {
                name: name.to_string(),
            });
        }

        let sql = format!("SELECT * FROM {} ORDER BY rowid", quote_ident(name));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(Value::from))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Table { columns, rows })
    }

    /// Row count of one snapshot without materializing it.
    pub fn row_count(&self, name: &str) -> Result<u64> {
        if !self.contains(name)? {
            return Err(KstError::SnapshotNotFound {
                name: name.to_string(),
            });
        }
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(name));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    // ──────────────────── writes ────────────────────

    /// Replace (or create) one snapshot table in a single transaction.
    pub fn replace_snapshot(&mut self, name: &str, table: &Table) -> Result<()> {
        let tx = self.conn.transaction()?;
        write_table(&tx, name, table)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace several snapshot tables atomically: either all land or none do.
    pub fn replace_many<'a, I>(&mut self, snapshots: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a Table)>,
    {
        let tx = self.conn.transaction()?;
        let mut written = 0;
        for (name, table) in snapshots {
            write_table(&tx, name, table)?;
            written += 1;
        }
        tx.commit()?;
        Ok(written)
    }

    /// Drop a snapshot table. Returns whether it existed.
    pub fn drop_snapshot(&mut self, name: &str) -> Result<bool> {
        let existed = self.contains(name)?;
        if existed {
            self.conn
                .execute_batch(&format!("DROP TABLE {};", quote_ident(name)))?;
        }
        Ok(existed)
    }

    /// Check that WAL mode is active (for diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }
}

/// Quote an SQL identifier: wrap in double quotes and double any embedded quote.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn write_table(conn: &Connection, name: &str, table: &Table) -> Result<()> {
    if table.columns.is_empty() {
        return Err(KstError::Runtime {
            details: format!("snapshot {name} has no columns"),
        });
    }

    let ident = quote_ident(name);
    let column_defs: Vec<String> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{} {}", quote_ident(col), table.column_kind(i).sql_type()))
        .collect();

    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {ident};
         CREATE TABLE {ident} ({});",
        column_defs.join(", ")
    ))?;

    let placeholders: Vec<String> = (1..=table.columns.len()).map(|i| format!("?{i}")).collect();
    let mut insert = conn.prepare(&format!(
        "INSERT INTO {ident} VALUES ({})",
        placeholders.join(",")
    ))?;
    for (line, row) in table.rows.iter().enumerate() {
        if row.len() != table.columns.len() {
            return Err(KstError::Runtime {
                details: format!(
                    "snapshot {name} row {line} has {} cells, expected {}",
                    row.len(),
                    table.columns.len()
                ),
            });
        }
        insert.execute(params_from_iter(row.iter()))?;
    }
    Ok(())
}

// ──────────────────── pragmas ────────────────────

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[KST-SQLITE] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

// ──────────────────── tests ────────────────────
