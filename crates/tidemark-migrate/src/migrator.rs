//! Moves the database between migration numbers.
//!
//! The migrator compares the registry (every known unit) with the ledger
//! (every applied unit), works out which units to run and in which
//! direction, then runs them one by one. Each unit's ledger row is written
//! right after its action succeeds, so a failure part-way through leaves the
//! earlier units recorded and the failing one untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tidemark_common::{Direction, Error, MigrationNumber, NoopProgress, ProgressSink, Result};
use tidemark_db::{Database, SqlValue};
use tracing::{debug, info, warn};

use crate::ledger::Ledger;
use crate::migration::Migration;
use crate::registry::MigrationRegistry;

/// One unit of a computed work list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMigration {
    pub number: MigrationNumber,
    pub name: String,
}

/// The units a `migrate` call would run, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub direction: Direction,
    pub from: i64,
    pub to: i64,
    pub steps: Vec<PlannedMigration>,
}

impl MigrationPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn numbers(&self) -> Vec<i64> {
        self.steps.iter().map(|s| s.number.get()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    Applied,
    Pending,
    /// Recorded in the ledger but absent from the registry.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStatus {
    pub number: MigrationNumber,
    pub name: Option<String>,
    pub state: MigrationState,
    pub completed_at: Option<DateTime<Utc>>,
}

pub struct Migrator {
    db: Arc<dyn Database>,
    registry: MigrationRegistry,
    ledger: Ledger,
    progress: Box<dyn ProgressSink>,
    transactional: bool,
}

impl Migrator {
    pub fn new(db: Arc<dyn Database>, registry: MigrationRegistry) -> Self {
        Self {
            db,
            registry,
            ledger: Ledger::default(),
            progress: Box::new(NoopProgress),
            transactional: true,
        }
    }

    /// Use `table` as the ledger table instead of `migrations`.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.ledger = Ledger::new(table);
        self
    }

    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Wrap each unit and its ledger write in a transaction. On by default.
    pub fn transactional(mut self, enabled: bool) -> Self {
        self.transactional = enabled;
        self
    }

    pub fn database(&self) -> &dyn Database {
        self.db.as_ref()
    }

    pub fn ledger_table(&self) -> &str {
        self.ledger.table()
    }

    /// Highest applied number, 0 when nothing is applied.
    pub fn current_number(&mut self) -> Result<i64> {
        self.ledger.current_version(self.db.as_ref())
    }

    /// Highest registered number, 0 when there are no migrations.
    pub fn latest_number(&mut self) -> Result<i64> {
        self.registry.latest_number()
    }

    /// Compute the work list for `target` without running anything.
    /// `None` means the latest registered number.
    pub fn migrations_to(&mut self, target: Option<i64>) -> Result<MigrationPlan> {
        let to = self.resolve_target(target)?;

        let db = self.db.as_ref();
        let applied = self.ledger.applied_numbers(db)?;
        let from = applied.last().map_or(0, |n| n.get());
        let direction = Direction::between(from, to);

        let selected = |number: &MigrationNumber| {
            let is_applied = applied.binary_search(number).is_ok();
            match direction {
                Direction::Up => number.get() <= to && !is_applied,
                Direction::Down => number.get() > to && is_applied,
            }
        };
        let planned = |(number, unit): (&MigrationNumber, &Arc<dyn Migration>)| PlannedMigration {
            number: *number,
            name: unit.name().to_string(),
        };

        let index = self.registry.load_all()?;
        let steps: Vec<PlannedMigration> = match direction {
            Direction::Up => index.iter().filter(|&(n, _)| selected(n)).map(planned).collect(),
            Direction::Down => index
                .iter()
                .rev()
                .filter(|&(n, _)| selected(n))
                .map(planned)
                .collect(),
        };

        debug!(
            "planned {} migrations {direction} from {from} to {to}",
            steps.len()
        );
        Ok(MigrationPlan {
            direction,
            from,
            to,
            steps,
        })
    }

    /// Bring the database to `target`, or to the latest migration when
    /// `None`. Returns whether any migration ran.
    pub fn migrate(&mut self, target: Option<i64>) -> Result<bool> {
        let current = self.current_number()?;
        let latest = self.latest_number()?;
        if current > latest {
            return Err(Error::InconsistentState { current, latest });
        }

        let plan = self.migrations_to(target)?;
        if plan.is_empty() {
            self.progress.report(&format!(
                "No migrations available, things are up to date (migration {current})!"
            ));
            return Ok(false);
        }

        self.progress.report(&format!(
            "Running {} migrations from migration {current} to {}...",
            plan.len(),
            plan.to
        ));

        for step in &plan.steps {
            self.progress.report(&format!(
                " - Migrating {} {}...",
                plan.direction, step.number
            ));
            self.run_step(plan.direction, step.number)?;
        }

        self.progress
            .report(&format!("Done! {} migrations migrated!", plan.len()));
        info!(
            "migrated {} from {} to {}",
            plan.direction, plan.from, plan.to
        );
        Ok(true)
    }

    /// Drop every table in the database, the ledger included.
    pub fn reset_database(&mut self) -> Result<()> {
        let db = self.db.as_ref();
        let dialect = db.dialect();

        let tables: Vec<String> = db
            .fetch_rows(dialect.list_tables_sql(), &[])?
            .iter()
            .filter_map(|row| row.get("name").and_then(SqlValue::as_str))
            .map(str::to_string)
            .collect();

        if !tables.is_empty() {
            db.execute(dialect.disable_integrity_sql(), &[])?;
            for table in &tables {
                if let Err(e) = db.execute(&dialect.drop_table_sql(table), &[]) {
                    if let Err(restore) = db.execute(dialect.enable_integrity_sql(), &[]) {
                        warn!("failed to re-enable integrity checks: {restore}");
                    }
                    self.ledger.invalidate();
                    return Err(e);
                }
            }
            db.execute(dialect.enable_integrity_sql(), &[])?;
        }

        self.ledger.invalidate();
        info!("reset database, dropped {} tables", tables.len());
        Ok(())
    }

    /// Every registered migration with its state, followed by ledger rows
    /// whose migration is no longer registered.
    pub fn status(&mut self) -> Result<Vec<MigrationStatus>> {
        let entries = self.ledger.entries(self.db.as_ref())?;
        let index = self.registry.load_all()?;

        let mut statuses: Vec<MigrationStatus> = index
            .iter()
            .map(|(number, unit)| {
                let entry = entries.iter().find(|e| e.number == *number);
                MigrationStatus {
                    number: *number,
                    name: Some(unit.name().to_string()),
                    state: if entry.is_some() {
                        MigrationState::Applied
                    } else {
                        MigrationState::Pending
                    },
                    completed_at: entry.and_then(|e| e.completed_at),
                }
            })
            .collect();

        statuses.extend(
            entries
                .iter()
                .filter(|e| !index.contains_key(&e.number))
                .map(|e| MigrationStatus {
                    number: e.number,
                    name: None,
                    state: MigrationState::Missing,
                    completed_at: e.completed_at,
                }),
        );
        statuses.sort_by_key(|s| s.number);
        Ok(statuses)
    }

    fn resolve_target(&mut self, target: Option<i64>) -> Result<i64> {
        let Some(to) = target else {
            return self.registry.latest_number();
        };
        if self.registry.contains(to)? {
            Ok(to)
        } else {
            Err(Error::InvalidTarget(to))
        }
    }

    fn run_step(&mut self, direction: Direction, number: MigrationNumber) -> Result<()> {
        let unit = self
            .registry
            .get(number)?
            .ok_or_else(|| Error::Other(format!("migration {number} vanished from the registry")))?;

        if !self.transactional {
            return self.apply(direction, number, unit.as_ref());
        }

        let dialect = self.db.dialect();
        self.db.execute(dialect.begin_sql(), &[])?;

        let outcome = self
            .apply(direction, number, unit.as_ref())
            .and_then(|()| self.db.execute(dialect.commit_sql(), &[]));

        if let Err(e) = outcome {
            if let Err(rollback) = self.db.execute(dialect.rollback_sql(), &[]) {
                warn!("rollback of migration {number} failed: {rollback}");
            }
            // the cached ledger may hold a write that was just rolled back
            self.ledger.invalidate();
            return Err(e);
        }
        Ok(())
    }

    fn apply(&mut self, direction: Direction, number: MigrationNumber, unit: &dyn Migration) -> Result<()> {
        let db = self.db.as_ref();
        match direction {
            Direction::Up => {
                unit.up(db)?;
                self.ledger.record_applied(db, number)?;
                info!("applied migration {number} ({})", unit.name());
            }
            Direction::Down => {
                unit.down(db)?;
                self.ledger.record_reverted(db, number)?;
                info!("reverted migration {number} ({})", unit.name());
            }
        }
        Ok(())
    }
}
