//! Hojin Sync - corporate registry synchronization tool

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use hojin_common::logging::{init_logging, LogConfig, LogLevel};
use hojin_common::types::{parse_date, DateWindow};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use hojin_sync::bulk::{BulkSource, HttpArchiveFetcher};
use hojin_sync::catalog::{Catalog, SourceSpec};
use hojin_sync::config::SyncConfig;
use hojin_sync::gbiz::GbizClient;
use hojin_sync::orchestrator::SyncOrchestrator;
use hojin_sync::reconcile::PgReconcileWriter;

#[derive(Parser, Debug)]
#[command(name = "hojin-sync")]
#[command(author, version, about = "Sync gBizINFO and NTA corporate registries into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Sync all (or the selected) catalog tables
    Run {
        /// First day of the update window (YYYYMMDD or YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,

        /// Last day of the update window, defaults to today
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,

        /// Restrict the run to these tables (repeatable)
        #[arg(short, long = "table")]
        tables: Vec<String>,

        /// Write the JSON run report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Apply the destination table migrations
    Migrate,

    /// List catalog tables
    Tables,
}

fn load_catalog(config: &SyncConfig) -> Result<Catalog> {
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::from_path(path)?,
        None => Catalog::builtin()?,
    };
    Ok(catalog)
}

async fn connect(config: &SyncConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    info!("Database connection pool established");
    Ok(pool)
}

fn resolve_window(from: Option<NaiveDate>, to: Option<NaiveDate>, lookback_days: u32) -> Result<DateWindow> {
    let to = to.unwrap_or_else(|| Local::now().date_naive());
    let window = match from {
        Some(from) => DateWindow::new(from, to)?,
        None => DateWindow::trailing(lookback_days, to),
    };
    Ok(window)
}

async fn run(
    config: SyncConfig,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    tables: Vec<String>,
    report_path: Option<PathBuf>,
) -> Result<usize> {
    let catalog = load_catalog(&config)?;
    let selected = catalog.select(&tables)?;
    let window = resolve_window(from, to, config.lookback_days)?;

    let pool = connect(&config).await?;
    let mut orchestrator = SyncOrchestrator::new(Arc::new(PgReconcileWriter::new(pool)), window);

    if selected.iter().any(|t| matches!(t.source, SourceSpec::Paged { .. })) {
        match GbizClient::new(&config.gbiz) {
            Ok(client) => orchestrator = orchestrator.with_pages(Arc::new(client)),
            Err(e) => warn!(error = %e, "gBizINFO client unavailable, paged tables will fail"),
        }
    }
    if selected.iter().any(|t| matches!(t.source, SourceSpec::Bulk(_))) {
        let fetcher = HttpArchiveFetcher::new(&config.bulk)?;
        orchestrator = orchestrator.with_bulk(BulkSource::new(Arc::new(fetcher), config.bulk.chunk_rows));
    }

    let report = orchestrator.run(&selected).await;

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Wrote run report");
    }

    Ok(report.failures().count())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("hojin-sync")
        .build()
        .overlay_env()?;

    let _guard = init_logging(&log_config)?;

    let config = SyncConfig::from_env()?;

    match cli.command {
        Command::Run {
            from,
            to,
            tables,
            report,
        } => {
            let failed = run(config, from, to, tables, report).await?;
            if failed > 0 {
                anyhow::bail!("{} table(s) failed to sync", failed);
            }
        },
        Command::Migrate => {
            let pool = connect(&config).await?;
            sqlx::migrate!("../../migrations")
                .run(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
            info!("Database migrations completed");
        },
        Command::Tables => {
            let catalog = load_catalog(&config)?;
            for table in catalog.tables() {
                println!(
                    "{:<50} {:<6} {:<22} {}",
                    table.name,
                    table.source.kind(),
                    format!("{:?}", table.merge),
                    table.primary_key.columns().join(", ")
                );
            }
        },
    }

    Ok(())
}
