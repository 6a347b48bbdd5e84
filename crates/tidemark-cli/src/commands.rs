use std::fmt::Write as _;
use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use dialoguer::Confirm;
use tidemark_common::{MigrationNumber, TracingProgress};
use tidemark_config::TidemarkConfig;
use tidemark_db::SqliteDatabase;
use tidemark_migrate::sql::create_migration_file;
use tidemark_migrate::{
    MigrationPlan, MigrationRegistry, MigrationState, MigrationStatus, Migrator,
    SqlDirectorySource,
};
use tracing::info;

/// Resolved configuration plus how output should be reported.
pub struct CommandContext {
    pub config: TidemarkConfig,
    /// Route progress lines through the JSON log stream instead of stdout.
    pub json_logs: bool,
}

fn registry(config: &TidemarkConfig) -> MigrationRegistry {
    MigrationRegistry::new(SqlDirectorySource::new(&config.migrations.directory))
        .with_policy(config.migrations.duplicates)
}

fn open_migrator(ctx: &CommandContext) -> Result<Migrator> {
    let config = &ctx.config;
    let db = SqliteDatabase::open_path(&config.database.path).with_context(|| {
        format!("failed to open database {}", config.database.path.display())
    })?;

    let migrator = Migrator::new(Arc::new(db), registry(config))
        .with_table(&config.migrations.table)
        .transactional(config.migrations.transactional);
    Ok(if ctx.json_logs {
        migrator.with_progress(TracingProgress)
    } else {
        migrator.with_progress(|message: &str| println!("{message}"))
    })
}

pub fn migrate(ctx: &CommandContext, to: Option<i64>, dry_run: bool) -> Result<()> {
    let mut migrator = open_migrator(ctx)?;
    if dry_run {
        let plan = migrator.migrations_to(to)?;
        print!("{}", render_plan(&plan));
        return Ok(());
    }
    migrator.migrate(to)?;
    Ok(())
}

pub fn plan(ctx: &CommandContext, to: Option<i64>) -> Result<()> {
    let plan = open_migrator(ctx)?.migrations_to(to)?;
    print!("{}", render_plan(&plan));
    Ok(())
}

pub fn status(ctx: &CommandContext, json: bool) -> Result<()> {
    let mut migrator = open_migrator(ctx)?;
    let current = migrator.current_number()?;
    let latest = migrator.latest_number()?;
    let migrations = migrator.status()?;

    if json {
        let report = serde_json::json!({
            "current": current,
            "latest": latest,
            "ledger_table": migrator.ledger_table(),
            "migrations": migrations,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_status(current, latest, &migrations));
    }
    Ok(())
}

pub fn reset(ctx: &CommandContext, yes: bool) -> Result<()> {
    if !yes {
        if !std::io::stdin().is_terminal() {
            bail!("refusing to reset without --yes in a non-interactive session");
        }
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Drop every table in {}?",
                ctx.config.database.path.display()
            ))
            .default(false)
            .interact()
            .context("confirmation cancelled")?;
        if !confirmed {
            println!("Reset aborted.");
            return Ok(());
        }
    }

    open_migrator(ctx)?.reset_database()?;
    println!("Database reset.");
    Ok(())
}

pub fn new_migration(ctx: &CommandContext, name: &str) -> Result<()> {
    let path = create_next(&ctx.config, name)?;
    println!("Created {}", path.display());
    Ok(())
}

/// Write the template for the migration after the latest one on disk.
fn create_next(config: &TidemarkConfig, name: &str) -> Result<std::path::PathBuf> {
    let latest = registry(config)
        .latest_number()
        .context("failed to read existing migrations")?;
    let Some(next) = latest.checked_add(1) else {
        bail!("migration {latest} is the highest number a migration can have");
    };
    let number = MigrationNumber::new(next)?;
    let path = create_migration_file(&config.migrations.directory, number, name)?;
    info!("created migration {number} at {}", path.display());
    Ok(path)
}

fn render_plan(plan: &MigrationPlan) -> String {
    if plan.is_empty() {
        return format!("Nothing to do, at migration {}.\n", plan.from);
    }

    let mut out = format!(
        "{} migrations {} from {} to {}:\n",
        plan.len(),
        plan.direction,
        plan.from,
        plan.to
    );
    for step in &plan.steps {
        let _ = writeln!(out, "  {:<4} {:04} {}", plan.direction.as_str(), step.number.get(), step.name);
    }
    out
}

fn render_status(current: i64, latest: i64, migrations: &[MigrationStatus]) -> String {
    let mut out = format!("Current migration: {current}\nLatest migration:  {latest}\n");
    if migrations.is_empty() {
        out.push_str("\nNo migrations found.\n");
        return out;
    }

    out.push('\n');
    for m in migrations {
        let mark = match m.state {
            MigrationState::Applied => "[x]",
            MigrationState::Pending => "[ ]",
            MigrationState::Missing => "[?]",
        };
        let name = m.name.as_deref().unwrap_or("(missing from migrations directory)");
        let _ = write!(out, "  {mark} {:04} {name}", m.number.get());
        if let Some(at) = m.completed_at {
            let _ = write!(out, "  {}", at.format("%Y-%m-%d %H:%M:%S"));
        }
        out.push('\n');
    }
    out
}
