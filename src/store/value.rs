//! Tagged cell values for schema-flexible snapshot rows.

use std::fmt;

use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// A single cell. Columns are discovered at load time, so rows carry tagged
/// values instead of a fixed record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Empty CSV field or SQL `NULL`.
    #[default]
    Null,
    /// Coerced integer column value.
    Integer(i64),
    /// Floating-point value read back from a store written by another tool.
    Real(f64),
    /// Text that was left uncoerced.
    Text(String),
}

impl Value {
    /// Build a value from a raw CSV field: blank fields become `Null`.
    pub fn from_field(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Null
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    /// Whether the value is `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value.
    ///
    /// Integers and reals convert directly; text is parsed after removing any of
    /// `separators`. Returns `None` for null and for text that is not a number.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self, separators: &[char]) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Integer(i) => Some(*i as f64),
            Self::Real(r) => Some(*r),
            Self::Text(s) => {
                let cleaned: String = s.trim().chars().filter(|c| !separators.contains(c)).collect();
                cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
            }
        }
    }

    /// Whether this value identifies the entity spelled `key`.
    ///
    /// Integer `42` matches `"42"`; text compares after trimming both sides.
    pub fn matches_key(&self, key: &str) -> bool {
        let key = key.trim();
        match self {
            Self::Null => false,
            Self::Integer(i) => key.parse::<i64>().is_ok_and(|k| k == *i),
            Self::Real(r) => key.parse::<f64>().is_ok_and(|k| k == *r),
            Self::Text(s) => s.trim() == key,
        }
    }

    /// Lookup key for grouping rows by entity. `None` for null identifiers.
    pub fn key(&self) -> Option<String> {
        match self {
            Self::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(r) => Self::Real(r),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Text(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Self::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Self::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}
