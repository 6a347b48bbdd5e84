use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, params_from_iter};
use tidemark_common::{Error, Result};
use tracing::{debug, info};

use crate::database::Database;
use crate::dialect::Dialect;
use crate::value::{Row, SqlValue};

/// SQLite-backed [`Database`].
pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// `:memory:` opens a private in-memory database, anything else a file.
    pub fn open_path(path: &Path) -> Result<Self> {
        if path.as_os_str() == ":memory:" {
            Self::in_memory()
        } else {
            Self::open(path)
        }
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("database lock poisoned".into()))
    }
}

impl Database for SqliteDatabase {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<()> {
        debug!(target: "tidemark::sql", "{sql}");
        let conn = self.connection()?;
        conn.execute(sql, params_from_iter(params.iter()))
            .map_err(|e| Error::Database(format!("failed to execute statement: {e}")))?;
        Ok(())
    }

    fn fetch_rows(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        debug!(target: "tidemark::sql", "{sql}");
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| Error::Database(format!("failed to run query: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| Error::Database(format!("failed to read row: {e}")))?
        {
            let mut record = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| Error::Database(format!("failed to read column {name}: {e}")))?;
                record.insert(name.clone(), from_value_ref(value));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn fetch_value(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlValue>> {
        debug!(target: "tidemark::sql", "{sql}");
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| Error::Database(format!("failed to run query: {e}")))?;

        let Some(row) = rows
            .next()
            .map_err(|e| Error::Database(format!("failed to read row: {e}")))?
        else {
            return Ok(None);
        };

        let value = row
            .get_ref(0)
            .map(from_value_ref)
            .map_err(|e| Error::Database(format!("failed to read value: {e}")))?;

        Ok((!value.is_null()).then_some(value))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(sql)
            .map_err(|e| Error::Database(format!("failed to execute script: {e}")))
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b.as_slice())),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}
