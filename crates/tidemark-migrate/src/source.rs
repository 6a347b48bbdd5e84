use std::path::{Path, PathBuf};
use std::sync::Arc;

use tidemark_common::{Error, Result};
use tracing::debug;

use crate::migration::Migration;
use crate::sql::SqlMigration;

/// Produces the constructed migration units the registry indexes.
pub trait MigrationSource {
    fn load(&self) -> Result<Vec<Arc<dyn Migration>>>;
}

/// Provider functions are sources too.
impl<F> MigrationSource for F
where
    F: Fn() -> Result<Vec<Arc<dyn Migration>>>,
{
    fn load(&self) -> Result<Vec<Arc<dyn Migration>>> {
        self()
    }
}

/// An explicit, in-code list of migrations.
#[derive(Default)]
pub struct StaticSource {
    migrations: Vec<Arc<dyn Migration>>,
}

impl StaticSource {
    pub fn new(migrations: Vec<Arc<dyn Migration>>) -> Self {
        Self { migrations }
    }

    pub fn with(mut self, migration: impl Migration + 'static) -> Self {
        self.migrations.push(Arc::new(migration));
        self
    }
}

impl MigrationSource for StaticSource {
    fn load(&self) -> Result<Vec<Arc<dyn Migration>>> {
        Ok(self.migrations.clone())
    }
}

/// Loads every `*.sql` file directly inside a directory.
pub struct SqlDirectorySource {
    directory: PathBuf,
}

impl SqlDirectorySource {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Migration files sorted by file name.
    pub fn find_files(&self) -> Result<Vec<PathBuf>> {
        if !self.directory.exists() {
            debug!(
                "migrations directory {} does not exist",
                self.directory.display()
            );
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.directory).map_err(|e| {
            Error::Config(format!(
                "failed to read migrations directory {}: {e}",
                self.directory.display()
            ))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| Error::Config(format!("failed to read directory entry: {e}")))?
                .path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl MigrationSource for SqlDirectorySource {
    fn load(&self) -> Result<Vec<Arc<dyn Migration>>> {
        let files = self.find_files()?;
        debug!(
            "found {} migration files in {}",
            files.len(),
            self.directory.display()
        );

        files
            .iter()
            .map(|path| Ok(Arc::new(SqlMigration::from_file(path)?) as Arc<dyn Migration>))
            .collect()
    }
}
