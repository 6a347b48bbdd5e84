//! Scripted [`Database`] double that records every executed statement.

use std::collections::HashMap;
use std::sync::Mutex;

use tidemark_common::{Error, Result};

use crate::database::Database;
use crate::dialect::Dialect;
use crate::value::{Row, SqlValue};

/// Answers queries from canned responses keyed by the exact SQL text and
/// logs each `execute` call in order.
pub struct RecordingDatabase {
    dialect: Dialect,
    executed: Mutex<Vec<(String, Vec<SqlValue>)>>,
    rows: Mutex<HashMap<String, Vec<Row>>>,
    values: Mutex<HashMap<String, SqlValue>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingDatabase {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            executed: Mutex::new(Vec::new()),
            rows: Mutex::new(HashMap::new()),
            values: Mutex::new(HashMap::new()),
            failing: Mutex::new(Vec::new()),
        }
    }

    /// Rows returned by `fetch_rows` for exactly `sql`.
    pub fn with_rows(self, sql: impl Into<String>, rows: Vec<Row>) -> Self {
        self.rows.lock().unwrap().insert(sql.into(), rows);
        self
    }

    /// Value returned by `fetch_value` for exactly `sql`.
    pub fn with_value(self, sql: impl Into<String>, value: SqlValue) -> Self {
        self.values.lock().unwrap().insert(sql.into(), value);
        self
    }

    /// Make `execute` fail for any statement containing `fragment`.
    pub fn failing_on(self, fragment: impl Into<String>) -> Self {
        self.failing.lock().unwrap().push(fragment.into());
        self
    }

    /// Executed statements, in order.
    pub fn statements(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    /// Executed statements together with their bound parameters.
    pub fn calls(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.executed.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.executed.lock().unwrap().clear();
    }

    /// Builds a one-column row, handy for table listings.
    pub fn row(column: &str, value: impl Into<SqlValue>) -> Row {
        let mut row = Row::new();
        row.insert(column.to_string(), value.into());
        row
    }
}

impl Database for RecordingDatabase {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<()> {
        let failing = self
            .failing
            .lock()
            .map_err(|_| Error::Database("recording lock poisoned".into()))?;
        if failing.iter().any(|f| sql.contains(f.as_str())) {
            return Err(Error::Database(format!("scripted failure: {sql}")));
        }
        self.executed
            .lock()
            .map_err(|_| Error::Database("recording lock poisoned".into()))?
            .push((sql.to_string(), params.to_vec()));
        Ok(())
    }

    fn fetch_rows(&self, sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| Error::Database("recording lock poisoned".into()))?;
        Ok(rows.get(sql).cloned().unwrap_or_default())
    }

    fn fetch_value(&self, sql: &str, _params: &[SqlValue]) -> Result<Option<SqlValue>> {
        let values = self
            .values
            .lock()
            .map_err(|_| Error::Database("recording lock poisoned".into()))?;
        Ok(values.get(sql).cloned())
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }
}
