use std::collections::BTreeMap;

use serde::Serialize;
use tidemark_common::MigrationNumber;

/// A single column value, as bound into or read out of a statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// One result row, keyed by column name.
pub type Row = BTreeMap<String, SqlValue>;

impl SqlValue {
    /// Integer view of the value. Some drivers hand back numeric columns as
    /// text, so decimal strings are accepted too.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Loose truthiness: NULL, zero, empty text and empty blobs are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            SqlValue::Null => false,
            SqlValue::Integer(v) => *v != 0,
            SqlValue::Real(v) => *v != 0.0,
            SqlValue::Text(s) => !s.is_empty() && s != "0",
            SqlValue::Blob(b) => !b.is_empty(),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<MigrationNumber> for SqlValue {
    fn from(n: MigrationNumber) -> Self {
        SqlValue::Integer(n.get())
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}
