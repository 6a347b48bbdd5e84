pub mod ledger;
pub mod migration;
pub mod migrator;
pub mod registry;
pub mod source;
pub mod sql;

pub use ledger::{Ledger, LedgerEntry};
pub use migration::Migration;
pub use migrator::{MigrationPlan, MigrationState, MigrationStatus, Migrator, PlannedMigration};
pub use registry::MigrationRegistry;
pub use source::{MigrationSource, SqlDirectorySource, StaticSource};
pub use sql::SqlMigration;
