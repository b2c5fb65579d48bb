//! bkh-harvester - Book package harvester
//!
//! One `run` is one harvest pass; an external scheduler (cron, systemd timer)
//! decides when passes happen. `stop` / `resume` toggle the operator stop
//! sentinel that every pass checks.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bkh_common::config::LoggingConfig;
use bkh_common::human_size::format_bytes;
use bkh_harvester::config::MetadataStrategy;
use bkh_harvester::db::SqliteWorkflowStore;
use bkh_harvester::models::RunReport;
use bkh_harvester::services::{BufferPolicy, DiskSpaceGuard, RunSentinel, SruCatalogClient};
use bkh_harvester::workflow::CatalogLookup;
use bkh_harvester::{HarvestOrchestrator, HarvesterConfig};

/// Command-line arguments for bkh-harvester
#[derive(Parser, Debug)]
#[command(name = "bkh-harvester")]
#[command(about = "Harvests converted book packages into workflow records")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workflow database (overrides [database] path)
    #[arg(long, global = true, env = "BKH_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one harvest pass
    Run {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show sentinels and free space
    Status,
    /// Ask running and future passes to stop
    Stop,
    /// Remove the stop request
    Resume,
    /// Create a template record in the workflow database
    InitTemplate {
        /// Template title (defaults to the configured template_title)
        #[arg(long)]
        title: Option<String>,
        /// Step titles in order; the first one starts OPEN
        #[arg(long = "step", required = true)]
        steps: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = HarvesterConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(path) = &args.database {
        config.database.path = Some(path.clone());
    }

    init_tracing(&config.logging)?;
    info!("bkh-harvester {}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Run { json } => run(config, json).await,
        Command::Status => status(&config),
        Command::Stop => {
            let s = sentinel(&config);
            s.request_stop().context("Failed to create stop file")?;
            println!("Stop requested ({})", s.stop_path().display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Resume => {
            let s = sentinel(&config);
            s.clear_stop().context("Failed to remove stop file")?;
            println!("Stop request cleared ({})", s.stop_path().display());
            Ok(ExitCode::SUCCESS)
        }
        Command::InitTemplate { title, steps } => {
            let title = title.unwrap_or_else(|| config.template_title.clone());
            let store = open_store(&config).await?;
            let template = store
                .create_template(&title, &steps)
                .await
                .context("Failed to create template")?;
            println!("Template '{}' created with {} steps (id {})", title, steps.len(), template.id);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let file_layer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = logging
        .file
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

fn sentinel(config: &HarvesterConfig) -> RunSentinel {
    RunSentinel::new(
        config.sentinels.stop_file.clone(),
        config.sentinels.running_file.clone(),
    )
}

async fn open_store(config: &HarvesterConfig) -> Result<SqliteWorkflowStore> {
    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    SqliteWorkflowStore::open(&db_path, config.storage_root.clone())
        .await
        .with_context(|| format!("Failed to open workflow database {}", db_path.display()))
}

async fn run(config: HarvesterConfig, json: bool) -> Result<ExitCode> {
    let store = Arc::new(open_store(&config).await?);

    let catalog: Option<Arc<dyn CatalogLookup>> = match config.metadata.strategy {
        MetadataStrategy::Catalog => {
            let client = SruCatalogClient::new(config.catalog.endpoints.clone())
                .context("Failed to create catalog client")?;
            Some(Arc::new(client) as Arc<dyn CatalogLookup>)
        }
        MetadataStrategy::Direct => None,
    };

    let orchestrator = HarvestOrchestrator::new(config, store, catalog)
        .context("Failed to set up harvester")?;
    let report = orchestrator.run_once().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_summary(report: &RunReport) {
    println!("Run {} finished in state {:?}", report.run_id, report.state);
    println!(
        "  processed: {}  closed: {}  skipped: {}  unadvanced: {}  failed: {}",
        report.processed(),
        report.closed(),
        report.skipped(),
        report.unadvanced(),
        report.failed()
    );
    for book in &report.books {
        println!(
            "  {} ({}): {:?}",
            book.reference,
            book.title.as_deref().unwrap_or("-"),
            book.outcome
        );
    }
    if let Some(request) = &report.conversion_request {
        println!("  conversion request: {:?}", request);
    }
}

fn status(config: &HarvesterConfig) -> Result<ExitCode> {
    let s = sentinel(config);
    let guard = DiskSpaceGuard::new(
        config.storage_root.clone(),
        BufferPolicy::from_config(config.buffer.as_deref()),
    );

    println!(
        "stop requested:  {} ({})",
        s.is_stop_requested(),
        s.stop_path().display()
    );
    println!(
        "run in progress: {} ({})",
        s.is_run_in_progress(),
        s.running_path().display()
    );
    match guard.free_space() {
        Ok(free) => println!(
            "free space:      {} on {} (buffer {})",
            format_bytes(free),
            config.storage_root.display(),
            format_bytes(guard.threshold_bytes())
        ),
        Err(e) => println!(
            "free space:      unknown on {} ({})",
            config.storage_root.display(),
            e
        ),
    }
    Ok(ExitCode::SUCCESS)
}
