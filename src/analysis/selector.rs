//! Distinct `(identifier, name)` pairs for picking an entity.
//!
//! Both the identifier and the name column must be present, otherwise there is
//! nothing to choose from and the result is empty.

#![allow(missing_docs)]

use std::collections::HashSet;

use serde::Serialize;

use crate::analysis::aggregate::Dataset;
use crate::store::table::Table;
use crate::store::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityChoice {
    pub id: Value,
    pub name: Value,
    /// `"<id> (<name>)"`, shown in pickers.
    pub display: String,
}

impl EntityChoice {
    fn new(id: Value, name: Value) -> Self {
        let display = format!("{id} ({name})");
        Self { id, name, display }
    }
}

/// Distinct pairs from one snapshot, in row order.
pub fn entities_in_table(table: &Table, id_column: &str, name_column: &str) -> Vec<EntityChoice> {
    let (Some(id_idx), Some(name_idx)) =
        (table.column_index(id_column), table.column_index(name_column))
    else {
        return Vec::new();
    };
    distinct(table.rows.iter().map(|row| (&row[id_idx], &row[name_idx])))
}

/// Distinct pairs from a dataset, in dataset order.
pub fn entities_in_dataset(
    dataset: &Dataset,
    id_column: &str,
    name_column: &str,
) -> Vec<EntityChoice> {
    let (Some(id_idx), Some(name_idx)) = (
        dataset.column_index(id_column),
        dataset.column_index(name_column),
    ) else {
        return Vec::new();
    };
    distinct(
        dataset
            .records
            .iter()
            .map(|r| (&r.values[id_idx], &r.values[name_idx])),
    )
}

fn distinct<'a>(pairs: impl Iterator<Item = (&'a Value, &'a Value)>) -> Vec<EntityChoice> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::new();
    for (id, name) in pairs {
        if id.is_null() {
            continue;
        }
        if seen.insert((id.to_string(), name.to_string())) {
            out.push(EntityChoice::new(id.clone(), name.clone()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregate::aggregate_tables;

    fn t(rows: &[(i64, &str)]) -> Table {
        Table {
            columns: vec!["governorID".into(), "name".into()],
            rows: rows
                .iter()
                .map(|(id, n)| vec![Value::Integer(*id), Value::from(*n)])
                .collect(),
        }
    }

    #[test]
    fn pairs_are_distinct_and_ordered() {
        let table = t(&[(2, "Bob"), (1, "Alice"), (2, "Bob"), (2, "Bobby")]);
        let choices = entities_in_table(&table, "governorID", "name");
        let display: Vec<_> = choices.iter().map(|c| c.display.as_str()).collect();
        assert_eq!(display, vec!["2 (Bob)", "1 (Alice)", "2 (Bobby)"]);
    }

    #[test]
    fn missing_id_column_yields_nothing() {
        assert!(entities_in_table(&t(&[(1, "A")]), "id", "name").is_empty());
    }

    #[test]
    fn missing_name_column_yields_nothing() {
        assert!(entities_in_table(&t(&[(1, "A")]), "governorID", "alias").is_empty());

        let id_only = Table {
            columns: vec!["governorID".into()],
            rows: vec![vec![Value::Integer(1)]],
        };
        assert!(entities_in_table(&id_only, "governorID", "name").is_empty());
        let ds = aggregate_tables([("01012024".to_string(), id_only)]);
        assert!(entities_in_dataset(&ds, "governorID", "name").is_empty());
    }

    #[test]
    fn null_name_is_shown_blank_when_column_exists() {
        let table = Table {
            columns: vec!["governorID".into(), "name".into()],
            rows: vec![vec![Value::Integer(7), Value::Null]],
        };
        let choices = entities_in_table(&table, "governorID", "name");
        assert_eq!(choices[0].display, "7 ()");
    }

    #[test]
    fn dataset_pairs_span_snapshots() {
        let ds = aggregate_tables([
            ("01012024".to_string(), t(&[(1, "A")])),
            ("01022024".to_string(), t(&[(1, "A"), (3, "C")])),
        ]);
        let choices = entities_in_dataset(&ds, "governorID", "name");
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[1].id, Value::Integer(3));
    }
}
