use tidemark_common::{MigrationNumber, Result};
use tidemark_db::Database;

/// A single numbered, reversible change to the database.
///
/// Units are immutable once loaded and identified by their number. Errors
/// raised by `up` or `down` reach the caller of the migrator untouched.
pub trait Migration {
    /// Identity and ordering key. Fails with
    /// [`tidemark_common::Error::MalformedMigration`] when the unit carries
    /// no valid number.
    fn number(&self) -> Result<MigrationNumber>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn up(&self, db: &dyn Database) -> Result<()>;

    /// Reverts `up`. Units that cannot be reverted keep the no-op default.
    fn down(&self, db: &dyn Database) -> Result<()> {
        let _ = db;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_common::Error;
    use tidemark_db::{Dialect, RecordingDatabase};

    struct CreateUsers;

    impl Migration for CreateUsers {
        fn number(&self) -> Result<MigrationNumber> {
            MigrationNumber::new(1)
        }

        fn up(&self, db: &dyn Database) -> Result<()> {
            db.execute("CREATE TABLE users (id INTEGER)", &[])
        }

        fn down(&self, db: &dyn Database) -> Result<()> {
            db.execute("DROP TABLE users", &[])
        }
    }

    struct UpOnly;

    impl Migration for UpOnly {
        fn number(&self) -> Result<MigrationNumber> {
            MigrationNumber::new(2)
        }

        fn up(&self, db: &dyn Database) -> Result<()> {
            db.execute("ALTER TABLE users ADD COLUMN email TEXT", &[])
        }
    }

    struct Unnumbered;

    impl Migration for Unnumbered {
        fn number(&self) -> Result<MigrationNumber> {
            MigrationNumber::new(0)
        }

        fn up(&self, _db: &dyn Database) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn number_is_reported() {
        assert_eq!(CreateUsers.number().unwrap().get(), 1);
    }

    #[test]
    fn missing_number_is_a_malformed_migration() {
        assert!(matches!(
            Unnumbered.number(),
            Err(Error::MalformedMigration(_))
        ));
    }

    #[test]
    fn up_and_down_run_their_statements() {
        let db = RecordingDatabase::new(Dialect::Sqlite);
        CreateUsers.up(&db).unwrap();
        CreateUsers.down(&db).unwrap();
        assert_eq!(
            db.statements(),
            vec!["CREATE TABLE users (id INTEGER)", "DROP TABLE users"]
        );
    }

    #[test]
    fn default_down_touches_nothing() {
        let db = RecordingDatabase::new(Dialect::Sqlite);
        UpOnly.down(&db).unwrap();
        assert!(db.statements().is_empty());
    }

    #[test]
    fn default_name_is_the_type_name() {
        assert!(UpOnly.name().ends_with("UpOnly"));
    }
}
