use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tidemark_common::{MigrationNumber, Result};
use tidemark_db::{Database, Row, SqlValue};
use tracing::{debug, info, warn};

pub const DEFAULT_TABLE: &str = "migrations";

/// One applied migration as stored in the ledger table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub number: MigrationNumber,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The persisted set of applied migration numbers.
///
/// Both the table check and the applied list are cached after their first
/// read. `record_applied` and `record_reverted` keep the cache in step with
/// the table; anything else that touches the table must call `invalidate`.
pub struct Ledger {
    table: String,
    has_table: Option<bool>,
    applied: Option<Vec<MigrationNumber>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE)
    }
}

impl Ledger {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            has_table: None,
            applied: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the ledger table unless it already exists.
    pub fn ensure_table(&mut self, db: &dyn Database) -> Result<()> {
        if self.has_table == Some(true) {
            return Ok(());
        }

        let exists = db
            .fetch_value(
                db.dialect().table_exists_sql(),
                &[SqlValue::from(self.table.as_str())],
            )?
            .is_some_and(|v| v.is_truthy());

        if !exists {
            db.execute(&db.dialect().create_ledger_sql(&self.table), &[])?;
            info!("created migration ledger table '{}'", self.table);
        }
        self.has_table = Some(true);
        Ok(())
    }

    /// Applied numbers, ascending.
    pub fn applied_numbers(&mut self, db: &dyn Database) -> Result<&[MigrationNumber]> {
        let applied = match self.applied.take() {
            Some(applied) => applied,
            None => {
                self.ensure_table(db)?;
                let applied = self.read_numbers(db)?;
                debug!(
                    "loaded {} applied migrations from '{}'",
                    applied.len(),
                    self.table
                );
                applied
            }
        };
        Ok(self.applied.insert(applied).as_slice())
    }

    pub fn is_applied(&mut self, db: &dyn Database, number: MigrationNumber) -> Result<bool> {
        Ok(self.applied_numbers(db)?.binary_search(&number).is_ok())
    }

    /// Highest applied number, 0 when nothing is applied.
    pub fn current_version(&mut self, db: &dyn Database) -> Result<i64> {
        Ok(self
            .applied_numbers(db)?
            .last()
            .map_or(0, |n| n.get()))
    }

    pub fn record_applied(&mut self, db: &dyn Database, number: MigrationNumber) -> Result<()> {
        self.ensure_table(db)?;
        let sql = format!(
            "INSERT INTO {} (migration_number) VALUES (?)",
            self.quoted_table(db)
        );
        db.execute(&sql, &[number.into()])?;

        if let Some(applied) = self.applied.as_mut() {
            if let Err(pos) = applied.binary_search(&number) {
                applied.insert(pos, number);
            }
        }
        Ok(())
    }

    pub fn record_reverted(&mut self, db: &dyn Database, number: MigrationNumber) -> Result<()> {
        self.ensure_table(db)?;
        let sql = format!(
            "DELETE FROM {} WHERE migration_number = ?",
            self.quoted_table(db)
        );
        db.execute(&sql, &[number.into()])?;

        if let Some(applied) = self.applied.as_mut() {
            applied.retain(|n| *n != number);
        }
        Ok(())
    }

    /// Every ledger row with its completion time. Always reads the table.
    pub fn entries(&mut self, db: &dyn Database) -> Result<Vec<LedgerEntry>> {
        self.ensure_table(db)?;
        let sql = format!(
            "SELECT migration_number, completed_at FROM {} ORDER BY migration_number",
            self.quoted_table(db)
        );

        let mut entries = Vec::new();
        for row in db.fetch_rows(&sql, &[])? {
            let Some(number) = self.row_number(&row) else {
                continue;
            };
            let completed_at = row
                .get("completed_at")
                .and_then(SqlValue::as_str)
                .and_then(parse_datetime);
            entries.push(LedgerEntry {
                number,
                completed_at,
            });
        }
        Ok(entries)
    }

    /// Forget everything cached. The next read goes to the database.
    pub fn invalidate(&mut self) {
        self.has_table = None;
        self.applied = None;
    }

    fn quoted_table(&self, db: &dyn Database) -> String {
        db.dialect().quote_ident(&self.table)
    }

    fn read_numbers(&self, db: &dyn Database) -> Result<Vec<MigrationNumber>> {
        let sql = format!(
            "SELECT migration_number FROM {} ORDER BY migration_number",
            self.quoted_table(db)
        );
        let mut numbers: Vec<MigrationNumber> = db
            .fetch_rows(&sql, &[])?
            .iter()
            .filter_map(|row| self.row_number(row))
            .collect();
        numbers.sort();
        numbers.dedup();
        Ok(numbers)
    }

    /// The row's migration number, or `None` with a warning when the stored
    /// value is not a positive integer.
    fn row_number(&self, row: &Row) -> Option<MigrationNumber> {
        let raw = row.get("migration_number");
        let number = raw
            .and_then(SqlValue::as_i64)
            .and_then(|n| MigrationNumber::new(n).ok());
        if number.is_none() {
            warn!(
                "ignoring ledger row in '{}' with unusable migration_number {raw:?}",
                self.table
            );
        }
        number
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // CURRENT_TIMESTAMP renders as "YYYY-MM-DD HH:MM:SS"
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .ok()
        })
}
