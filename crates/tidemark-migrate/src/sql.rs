//! Migrations written as plain SQL files.
//!
//! A file is named `<number>_<name>.sql` and split into sections by marker
//! comments:
//!
//! ```sql
//! -- up
//! CREATE TABLE users (id INTEGER PRIMARY KEY);
//!
//! -- down
//! DROP TABLE users;
//! ```
//!
//! Lines before the first marker belong to the up section.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tidemark_common::{Error, MigrationNumber, Result};
use tidemark_db::Database;

use crate::migration::Migration;

#[derive(Debug, Clone)]
pub struct SqlMigration {
    number: Option<MigrationNumber>,
    name: String,
    up_sql: String,
    down_sql: String,
    origin: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Up,
    Down,
}

impl SqlMigration {
    pub fn new(
        number: MigrationNumber,
        name: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: impl Into<String>,
    ) -> Self {
        Self {
            number: Some(number),
            name: name.into(),
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
            origin: None,
        }
    }

    /// Read a migration file. A file name without a leading number still
    /// loads, but the unit fails once its number is asked for.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read migration {}: {e}", path.display()))
        })?;

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let (number, name) = parse_file_stem(stem);
        let (up_sql, down_sql) = split_sections(&contents);

        Ok(Self {
            number,
            name,
            up_sql,
            down_sql,
            origin: Some(path.to_path_buf()),
        })
    }

    pub fn up_sql(&self) -> &str {
        &self.up_sql
    }

    pub fn down_sql(&self) -> &str {
        &self.down_sql
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    fn run(&self, db: &dyn Database, sql: &str) -> Result<()> {
        if !has_statements(sql) {
            return Ok(());
        }
        let number = self.number()?;
        db.execute_batch(sql).map_err(|e| Error::Migration {
            number: number.get(),
            message: e.to_string(),
        })
    }
}

impl Migration for SqlMigration {
    fn number(&self) -> Result<MigrationNumber> {
        self.number.ok_or_else(|| {
            let origin = self
                .origin
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| self.name.clone());
            Error::MalformedMigration(format!(
                "{origin}: file name does not start with a migration number"
            ))
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, db: &dyn Database) -> Result<()> {
        self.run(db, &self.up_sql)
    }

    fn down(&self, db: &dyn Database) -> Result<()> {
        self.run(db, &self.down_sql)
    }
}

/// `0003_add_users` → (3, "add_users"). Non-positive or non-numeric
/// prefixes yield no number.
fn parse_file_stem(stem: &str) -> (Option<MigrationNumber>, String) {
    let (prefix, name) = stem.split_once('_').unwrap_or((stem, ""));
    let number = prefix
        .parse::<i64>()
        .ok()
        .and_then(|n| MigrationNumber::new(n).ok());
    let name = if number.is_some() { name } else { stem };
    (number, name.to_string())
}

/// Whether `sql` holds anything besides blank lines and `--` comments.
fn has_statements(sql: &str) -> bool {
    sql.lines().map(str::trim).any(|l| !l.is_empty() && !l.starts_with("--"))
}

fn section_marker(line: &str) -> Option<Section> {
    let tag = line.trim().strip_prefix("--")?.trim().to_ascii_lowercase();
    match tag.as_str() {
        "up" | "up:" | "up migration" => Some(Section::Up),
        "down" | "down:" | "down migration" => Some(Section::Down),
        _ => None,
    }
}

fn split_sections(contents: &str) -> (String, String) {
    let mut up = Vec::new();
    let mut down = Vec::new();
    let mut current = Section::Up;

    for line in contents.lines() {
        if let Some(section) = section_marker(line) {
            current = section;
            continue;
        }
        match current {
            Section::Up => up.push(line),
            Section::Down => down.push(line),
        }
    }

    (
        up.join("\n").trim().to_string(),
        down.join("\n").trim().to_string(),
    )
}

/// Write an empty migration template as `<number>_<slug>.sql` inside `dir`.
/// Refuses to overwrite an existing file.
pub fn create_migration_file(dir: &Path, number: MigrationNumber, name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| {
        Error::Config(format!(
            "failed to create migrations directory {}: {e}",
            dir.display()
        ))
    })?;

    let slug = slugify(name);
    if slug.is_empty() {
        return Err(Error::Config(format!(
            "migration name '{name}' has no usable characters"
        )));
    }

    let path = dir.join(format!("{:04}_{slug}.sql", number.get()));
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| Error::Config(format!("failed to create {}: {e}", path.display())))?;

    let template = format!(
        "-- Migration: {name}\n\
         -- Created: {}\n\
         \n\
         -- up\n\
         \n\
         \n\
         -- down\n\
         \n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    file.write_all(template.as_bytes())?;

    Ok(path)
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}
