//! mssql-drift CLI - drift reports and dependency-safe data migration between SQL Server databases.

mod prompt;
mod render;

use clap::{Parser, Subcommand};
use mssql_drift::diff::{export_definitions, ProcedureOptions};
use mssql_drift::{
    archive_old_versions, compare_databases, AssumeYes, CompareOptions, Config, Confirmer,
    MssqlDatabase, Migrator, RunStatus, SyncError,
};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[derive(Parser)]
#[command(name = "mssql-drift")]
#[command(about = "Compare SQL Server databases and migrate data in foreign-key order")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output JSON result instead of text
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Send log events to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare tables, columns and stored procedures between source and target
    Compare {
        /// Compare tables (default: tables and procedures)
        #[arg(long)]
        tables: bool,

        /// Compare stored procedures (default: tables and procedures)
        #[arg(long)]
        procedures: bool,

        /// Compare the columns of every common table
        #[arg(long)]
        table_details: bool,

        /// Also list common tables without column differences
        #[arg(long)]
        all_tables: bool,

        /// Show a unified diff for each differing procedure
        #[arg(long)]
        show_diff: bool,

        /// Write both definitions of each differing procedure to this directory
        #[arg(long)]
        export_dir: Option<PathBuf>,

        /// Only compare this procedure (name or schema.name)
        #[arg(long)]
        procedure: Option<String>,
    },

    /// Replace the target's rows in every common table with the source's
    Migrate {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,

        /// Show the plan without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Move superseded NNN_Name.sql procedure scripts into Deprecated/
    ArchiveProcedures {
        /// Scripts root holding one directory per entity
        #[arg(long)]
        dir: PathBuf,

        /// Move the files (default: only report what would move)
        #[arg(long)]
        apply: bool,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format, cli.log_file.as_deref())?;

    // Archiving works on local files only
    if let Commands::ArchiveProcedures { dir, apply } = &cli.command {
        let report = archive_old_versions(dir, !apply)?;
        let mut out = open_output(cli.output.as_deref())?;
        if cli.output_json {
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        } else {
            render::archive(&mut out, &report)?;
        }
        return Ok(());
    }

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match &cli.command {
        Commands::ArchiveProcedures { .. } => unreachable!(), // Handled above

        Commands::Compare {
            tables,
            procedures,
            table_details,
            all_tables,
            show_diff,
            export_dir,
            procedure,
        } => {
            let mut source = MssqlDatabase::connect("source", &config.source).await?;
            let mut target = MssqlDatabase::connect("target", &config.target).await?;

            let options = CompareOptions {
                tables: *tables || !*procedures,
                procedures: *procedures || !*tables,
                table_details: *table_details,
                include_unchanged: *all_tables,
                procedure: ProcedureOptions {
                    show_diff: *show_diff,
                    name_filter: procedure.clone(),
                },
            };
            let report = compare_databases(&mut source, &mut target, &options).await?;

            if let (Some(dir), Some(procs)) = (export_dir, &report.procedures) {
                let written = export_definitions(dir, &procs.different)?;
                info!("Exported {} procedure definitions to {}", written.len(), dir.display());
            }

            let mut out = open_output(cli.output.as_deref())?;
            if cli.output_json {
                writeln!(out, "{}", report.to_json()?)?;
            } else {
                render::drift(&mut out, &report)?;
            }
        }

        Commands::Migrate { yes, dry_run } => {
            let mut source = MssqlDatabase::connect("source", &config.source).await?;
            let mut target = MssqlDatabase::connect("target", &config.target).await?;
            let migrator = Migrator::new(&config.migration);

            if *dry_run {
                let plan = migrator.plan(&mut source, &mut target).await?;
                plan.log();
                let mut out = open_output(cli.output.as_deref())?;
                if cli.output_json {
                    writeln!(out, "{}", serde_json::to_string_pretty(&plan)?)?;
                } else {
                    render::plan(&mut out, &plan)?;
                }
                return Ok(());
            }

            let mut confirmer: Box<dyn Confirmer> = if *yes {
                Box::new(AssumeYes)
            } else {
                Box::new(prompt::TokenPrompt::new(&config.migration.confirm_token))
            };
            let summary = migrator
                .run(&mut source, &mut target, confirmer.as_mut())
                .await?;

            if summary.status == RunStatus::Aborted {
                println!("Migration cancelled. No changes were made.");
                return Ok(());
            }

            let mut out = open_output(cli.output.as_deref())?;
            if cli.output_json {
                writeln!(out, "{}", summary.to_json()?)?;
            } else {
                render::summary(&mut out, &summary)?;
            }
        }

        Commands::HealthCheck => {
            let source = check(&config.source, "source").await;
            let target = check(&config.target, "target").await;

            let mut out = open_output(cli.output.as_deref())?;
            if cli.output_json {
                let json = serde_json::json!({
                    "source": source.to_json(),
                    "target": target.to_json(),
                    "healthy": source.error.is_none() && target.error.is_none(),
                });
                writeln!(out, "{}", serde_json::to_string_pretty(&json)?)?;
            } else {
                render::health(&mut out, &[&source, &target])?;
            }

            for side in [source, target] {
                if let Some(err) = side.error {
                    return Err(SyncError::connection(side.side, err));
                }
            }
        }
    }

    Ok(())
}

/// Outcome of connecting to one side.
struct HealthResult {
    side: &'static str,
    label: String,
    version: Option<String>,
    latency_ms: u128,
    error: Option<String>,
}

impl HealthResult {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "database": self.label,
            "connected": self.error.is_none(),
            "version": self.version,
            "latency_ms": self.latency_ms,
            "error": self.error,
        })
    }
}

async fn check(config: &mssql_drift::DatabaseConfig, side: &'static str) -> HealthResult {
    let start = Instant::now();
    let outcome = match MssqlDatabase::connect(side, config).await {
        Ok(mut db) => db.health_check().await,
        Err(e) => Err(e),
    };
    let latency_ms = start.elapsed().as_millis();
    let (version, error) = match outcome {
        Ok(v) => (Some(v), None),
        Err(e) => (None, Some(e.to_string())),
    };
    HealthResult {
        side,
        label: config.display_name().to_string(),
        version,
        latency_ms,
        error,
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, SyncError> {
    Ok(match path {
        Some(p) => Box::new(File::create(p)?),
        None => Box::new(io::stdout()),
    })
}

fn setup_logging(verbosity: &str, format: &str, log_file: Option<&Path>) -> Result<(), SyncError> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let writer = match log_file {
        Some(path) => BoxMakeWriter::new(Mutex::new(File::create(path)?)),
        None => BoxMakeWriter::new(io::stderr),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(log_file.is_none())
        .with_writer(writer);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
