use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tidemark_common::{DuplicatePolicy, Error, Result};
use tidemark_db::Dialect;

const MAX_TABLE_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TidemarkConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`.
    pub path: PathBuf,
    pub dialect: Dialect,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tidemark.db"),
            dialect: Dialect::Sqlite,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    pub directory: PathBuf,
    /// Ledger table name.
    pub table: String,
    pub duplicates: DuplicatePolicy,
    /// Wrap each migration and its ledger write in one transaction.
    pub transactional: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("migrations"),
            table: "migrations".to_string(),
            duplicates: DuplicatePolicy::Reject,
            transactional: true,
        }
    }
}

impl TidemarkConfig {
    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.migrations.table)?;
        if self.database.path.as_os_str().is_empty() {
            return Err(Error::Config("database.path cannot be empty".into()));
        }
        if self.migrations.directory.as_os_str().is_empty() {
            return Err(Error::Config("migrations.directory cannot be empty".into()));
        }
        Ok(())
    }
}

/// Ledger table names are interpolated into DDL, so keep them to plain
/// identifiers.
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Config("migrations.table cannot be empty".into()));
    }
    if name.len() > MAX_TABLE_NAME_LEN {
        return Err(Error::Config(format!(
            "migrations.table too long (max {MAX_TABLE_NAME_LEN} characters)"
        )));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(Error::Config(format!(
            "migrations.table '{name}' cannot start with a digit"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Config(format!(
            "migrations.table '{name}' may only contain ASCII letters, digits and underscores"
        )));
    }
    Ok(())
}
