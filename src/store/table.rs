//! In-memory snapshot table: ordered columns plus rows aligned to them.

use serde::Serialize;

use crate::store::value::Value;

/// Declared SQL affinity of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Text,
}

impl ColumnKind {
    pub(crate) const fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
        }
    }
}

/// One snapshot's worth of data. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` among the columns.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at (`row`, `column`), or `None` when the column does not exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Column kind inferred from contents: integer only when every non-null cell
    /// is an integer and at least one cell is non-null.
    pub fn column_kind(&self, idx: usize) -> ColumnKind {
        let mut saw_value = false;
        for row in &self.rows {
            match row.get(idx) {
                Some(Value::Integer(_)) => saw_value = true,
                Some(Value::Null) | None => {}
                Some(_) => return ColumnKind::Text,
            }
        }
        if saw_value {
            ColumnKind::Integer
        } else {
            ColumnKind::Text
        }
    }

    /// Names of the columns whose kind is integer.
    pub fn integer_columns(&self) -> Vec<String> {
        (0..self.columns.len())
            .filter(|&i| self.column_kind(i) == ColumnKind::Integer)
            .map(|i| self.columns[i].clone())
            .collect()
    }

    /// Iterate over each row as `(column, value)` pairs.
    pub fn records(&self) -> impl Iterator<Item = Vec<(&str, &Value)>> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table {
            columns: vec!["governorID".into(), "name".into(), "power".into()],
            rows: vec![
                vec![Value::Integer(1), "Alice".into(), Value::Integer(100)],
                vec![Value::Integer(2), "Bob".into(), Value::Null],
            ],
        }
    }

    #[test]
    fn value_lookup_by_column_name() {
        let t = sample();
        assert_eq!(t.value(1, "name"), Some(&Value::Text("Bob".into())));
        assert_eq!(t.value(0, "missing"), None);
        assert_eq!(t.value(9, "name"), None);
    }

    #[test]
    fn column_kinds_follow_contents() {
        let t = sample();
        assert_eq!(t.column_kind(0), ColumnKind::Integer);
        assert_eq!(t.column_kind(1), ColumnKind::Text);
        assert_eq!(t.column_kind(2), ColumnKind::Integer);
        assert_eq!(t.integer_columns(), vec!["governorID", "power"]);
    }

    #[test]
    fn all_null_column_is_text() {
        let t = Table {
            columns: vec!["x".into()],
            rows: vec![vec![Value::Null], vec![Value::Null]],
        };
        assert_eq!(t.column_kind(0), ColumnKind::Text);
    }

    #[test]
    fn records_pair_columns_with_values() {
        let t = sample();
        let first: Vec<_> = t.records().next().unwrap();
        assert_eq!(first[0], ("governorID", &Value::Integer(1)));
        assert_eq!(first[2], ("power", &Value::Integer(100)));
    }
}
