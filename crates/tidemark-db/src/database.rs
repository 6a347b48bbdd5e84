use tidemark_common::Result;

use crate::dialect::Dialect;
use crate::value::{Row, SqlValue};

/// Blocking access to the target database.
///
/// Implementations report every driver failure as
/// [`tidemark_common::Error::Database`]. Callers never inspect driver error
/// codes, they only propagate.
pub trait Database {
    /// Run a statement with positional `?` parameters, discarding any result.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<()>;

    /// Run a query and return every row keyed by column name.
    fn fetch_rows(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// First column of the first row. `None` when there is no row or the
    /// value is NULL.
    fn fetch_value(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlValue>>;

    fn dialect(&self) -> Dialect;

    /// Run a multi-statement script without parameters.
    ///
    /// The default splits on `;`, which is fine for plain DDL. Backends with
    /// native script support should override it.
    fn execute_batch(&self, sql: &str) -> Result<()> {
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            self.execute(statement, &[])?;
        }
        Ok(())
    }
}
