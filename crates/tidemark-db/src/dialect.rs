use serde::{Deserialize, Serialize};

/// SQL flavour used for the ledger table, table listing and resets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    #[serde(alias = "mariadb")]
    MySql,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
        }
    }

    pub fn quote_ident(self, name: &str) -> String {
        match self {
            Dialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
            Dialect::MySql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Query returning a non-empty value when the named table exists. Takes
    /// the table name as its only parameter.
    pub fn table_exists_sql(self) -> &'static str {
        match self {
            Dialect::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            Dialect::MySql => "SHOW TABLES LIKE ?",
        }
    }

    pub fn create_ledger_sql(self, table: &str) -> String {
        let table = self.quote_ident(table);
        match self {
            Dialect::Sqlite => format!(
                "CREATE TABLE {table} (
                    migration_number INTEGER NOT NULL,
                    completed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    PRIMARY KEY (migration_number)
                )"
            ),
            Dialect::MySql => format!(
                "CREATE TABLE {table} (
                    `migration_number` BIGINT NOT NULL,
                    `completed_at` TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    PRIMARY KEY (`migration_number`)
                )"
            ),
        }
    }

    /// Lists every user table in the current schema as a `name` column.
    pub fn list_tables_sql(self) -> &'static str {
        match self {
            Dialect::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name"
            }
            Dialect::MySql => {
                "SELECT table_name AS name FROM information_schema.tables WHERE table_schema = DATABASE() ORDER BY table_name"
            }
        }
    }

    pub fn drop_table_sql(self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_ident(table))
    }

    pub fn disable_integrity_sql(self) -> &'static str {
        match self {
            Dialect::Sqlite => "PRAGMA foreign_keys = OFF",
            Dialect::MySql => "SET foreign_key_checks = 0",
        }
    }

    pub fn enable_integrity_sql(self) -> &'static str {
        match self {
            Dialect::Sqlite => "PRAGMA foreign_keys = ON",
            Dialect::MySql => "SET foreign_key_checks = 1",
        }
    }

    pub fn begin_sql(self) -> &'static str {
        match self {
            Dialect::Sqlite => "BEGIN",
            Dialect::MySql => "START TRANSACTION",
        }
    }

    pub fn commit_sql(self) -> &'static str {
        "COMMIT"
    }

    pub fn rollback_sql(self) -> &'static str {
        "ROLLBACK"
    }
}
