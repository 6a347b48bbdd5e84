mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tidemark_config::{ConfigLoader, TidemarkConfig};
use tidemark_db::Dialect;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tidemark", version, about = "Numbered schema migrations")]
struct Cli {
    /// Config file (yaml or toml). Defaults to tidemark.yml / tidemark.toml
    /// in the working directory.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, or :memory:
    #[arg(long, global = true, env = "TIDEMARK_DATABASE")]
    database: Option<PathBuf>,

    /// Directory holding the numbered .sql migration files
    #[arg(long, global = true, env = "TIDEMARK_MIGRATIONS")]
    migrations: Option<PathBuf>,

    /// Ledger table name
    #[arg(long, global = true)]
    table: Option<String>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Apply or revert migrations until the database is at the target
    Migrate {
        /// Target migration number (defaults to the latest)
        #[arg(long)]
        to: Option<i64>,

        /// Print what would run without touching the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the current version and every migration's state
    Status {
        #[arg(long)]
        json: bool,
    },

    /// List the migrations a migrate call would run
    Plan {
        #[arg(long)]
        to: Option<i64>,
    },

    /// Drop every table in the database
    Reset {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Create an empty migration file numbered after the latest one
    New {
        /// Short description, used in the file name
        name: String,
    },
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

/// Config file values with command-line overrides applied on top.
fn resolve_config(cli: &Cli) -> Result<TidemarkConfig> {
    let cwd = std::env::current_dir().context("failed to determine working directory")?;
    let mut config =
        ConfigLoader::load(cli.config.as_deref(), &cwd).context("failed to load config")?;

    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    if let Some(dir) = &cli.migrations {
        config.migrations.directory = dir.clone();
    }
    if let Some(table) = &cli.table {
        config.migrations.table = table.clone();
    }
    config.validate().context("invalid configuration")?;

    if config.database.dialect != Dialect::Sqlite {
        bail!(
            "database.dialect '{}' has no backend in this build; only sqlite is supported",
            config.database.dialect.as_str()
        );
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let ctx = commands::CommandContext {
        config: resolve_config(&cli)?,
        json_logs: cli.log_format == LogFormat::Json,
    };

    match cli.command {
        Command::Migrate { to, dry_run } => commands::migrate(&ctx, to, dry_run),
        Command::Status { json } => commands::status(&ctx, json),
        Command::Plan { to } => commands::plan(&ctx, to),
        Command::Reset { yes } => commands::reset(&ctx, yes),
        Command::New { name } => commands::new_migration(&ctx, &name),
    }
}
