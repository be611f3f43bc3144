//! # Gazette CLI Application
//!
//! This module implements the command-line interface of the gazette crawler.
//!
//! ## Key Components
//!
//! - CLI argument parsing with clap
//! - Subcommands:
//!   - `crawl`: crawl the catalog and ingest every content window
//!   - `folders`: list the folders of the catalog root
//!   - `count`: inspect the stored collections
//!
//! ## Features
//!
//! - Bounded concurrency and optional request pacing
//! - Graceful Ctrl-C cancellation that lets in-flight writes finish
//! - Progress tracking for long-running crawls
//! - Telemetry integration for monitoring
//! - Both JSON and text output formats

mod telemetry;

use std::num::NonZeroU32;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Args, CommandFactory, Parser, Subcommand};
use gazette::catalog::{
    BucketSampling, CrawlConfig, CrawlEvent, HttpFetcher, Orchestrator, PageFetcher,
    RateLimitedFetcher, RunReport, WindowStatus, discover_folders,
};
use gazette::index::{DocumentStore, LibSqlStore};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, watch};
use tracing::{info, instrument, warn};

#[derive(Parser)]
#[command(author, version, about = "Crawl a legal gazette catalog into a local database", long_about = None)]
struct Cli {
    /// Export traces and metrics over OTLP/HTTP
    #[arg(long, global = true)]
    otlp: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl the catalog and store every gazette record
    Crawl(CrawlArgs),

    /// List the folders of the catalog and their collections
    Folders(FoldersArgs),

    /// Show document counts of the stored collections
    Count(CountArgs),
}

#[derive(Args, Debug)]
struct CatalogArgs {
    /// Scheme and host of the catalog
    #[arg(long, default_value = "http://digesto.asamblea.gob.ni")]
    origin: String,

    /// Store a folder in a named collection (FOLDER=NAME, repeatable)
    #[arg(long = "collection", value_parser = parse_collection_override)]
    collections: Vec<(String, String)>,

    /// Request timeout in seconds
    #[arg(long, default_value = "60")]
    timeout: u64,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    #[command(flatten)]
    catalog: CatalogArgs,

    /// Database path
    #[arg(short, long, default_value = "gazette.db")]
    database: PathBuf,

    /// Maximum number of requests and writes in flight
    #[arg(short, long, default_value = "8")]
    concurrency: usize,

    /// Maximum requests per minute (unlimited when omitted)
    #[arg(short, long)]
    rate: Option<u32>,

    /// Fraction of each folder's date buckets to crawl
    #[arg(long)]
    sample_ratio: Option<f64>,

    /// Maximum number of date buckets per folder when sampling
    #[arg(long, requires = "sample_ratio")]
    sample_cap: Option<usize>,

    /// Consecutive failed batch writes that abort the run
    #[arg(long, default_value = "5")]
    max_write_failures: usize,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct FoldersArgs {
    #[command(flatten)]
    catalog: CatalogArgs,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct CountArgs {
    /// Collection to count (all collections when omitted)
    collection: Option<String>,

    /// Database path
    #[arg(short, long, default_value = "gazette.db")]
    database: PathBuf,
}

fn parse_collection_override(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((folder, name)) if !folder.trim().is_empty() && !name.trim().is_empty() => {
            Ok((folder.trim().to_string(), name.trim().to_string()))
        }
        _ => Err(format!("expected FOLDER=NAME, got '{}'", value)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    let _otel = telemetry::init_tracing_subscriber(cli.otlp, cli.log_dir.as_deref())?;

    match cli.command {
        Some(Commands::Crawl(args)) => {
            crawl_command(args).await?;
        }
        Some(Commands::Folders(args)) => {
            folders_command(args).await?;
        }
        Some(Commands::Count(args)) => {
            count_command(args).await?;
        }
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

fn catalog_config(args: &CatalogArgs) -> CrawlConfig {
    args.collections.iter().fold(
        CrawlConfig::builder()
            .origin(args.origin.clone())
            .request_timeout_secs(args.timeout),
        |builder, (folder, name)| builder.collection_override(folder.clone(), name.clone()),
    )
    .build()
}

#[instrument]
async fn crawl_command(args: CrawlArgs) -> anyhow::Result<()> {
    let sampling = match args.sample_ratio {
        Some(ratio) if !(0.0..=1.0).contains(&ratio) || ratio == 0.0 => {
            return Err(anyhow!("--sample-ratio must be in (0, 1], got {}", ratio));
        }
        Some(ratio) => Some(BucketSampling {
            ratio,
            cap: args.sample_cap.unwrap_or(usize::MAX),
        }),
        None => None,
    };

    let mut config = catalog_config(&args.catalog);
    config.max_in_flight = args.concurrency.max(1);
    config.max_consecutive_write_failures = args.max_write_failures.max(1);
    config.bucket_sampling = sampling;
    config.requests_per_minute = args.rate;

    println!("Crawling {}...", args.catalog.origin);
    println!("Using concurrency level: {}", config.max_in_flight);

    let store = LibSqlStore::open(&args.database.to_string_lossy()).await?;
    let fetcher = HttpFetcher::new(&config)?;

    // Ctrl-C stops new requests; in-flight writes are allowed to finish
    let (shutdown_sender, shutdown_receiver) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight work");
            let _ = shutdown_sender.send(true);
        }
    });

    // Create a channel for progress updates
    let (progress_sender, mut progress_receiver) = mpsc::channel(100);

    let progress_bar = ProgressBar::new(0);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")?
            .progress_chars("##-"),
    );
    progress_bar.set_message("Listing folders...");

    let start_time = std::time::Instant::now();

    // Spawn a task to process progress updates
    let progress_handle = tokio::spawn({
        let progress_bar = progress_bar.clone();
        async move {
            while let Some(event) = progress_receiver.recv().await {
                match event {
                    CrawlEvent::FoldersDiscovered { count } => {
                        progress_bar.set_message(format!("Found {} folders", count));
                    }
                    CrawlEvent::WindowsQueued { folder_id, count } => {
                        progress_bar.inc_length(count as u64);
                        progress_bar.set_message(format!("Queued {} windows of folder {}", count, folder_id));
                    }
                    CrawlEvent::WindowFinished {
                        folder_id,
                        window,
                        status,
                    } => {
                        progress_bar.inc(1);
                        let outcome = match status {
                            WindowStatus::Stored(outcome) => format!("{} inserted", outcome.inserted),
                            WindowStatus::NoRecords => "no records".to_string(),
                            WindowStatus::Failed => "failed".to_string(),
                            WindowStatus::Skipped => "skipped".to_string(),
                        };
                        progress_bar.set_message(format!("Folder {} {}: {}", folder_id, window, outcome));
                    }
                    CrawlEvent::Stopping { cancelled } => {
                        progress_bar.set_message(if cancelled {
                            "Cancelled, draining in-flight work"
                        } else {
                            "Store unavailable, draining in-flight work"
                        });
                    }
                }
            }
            progress_bar.finish_with_message("Crawl finished");
        }
    });

    let result = match config.requests_per_minute.and_then(NonZeroU32::new) {
        Some(rate) => {
            let fetcher = RateLimitedFetcher::per_minute(fetcher, rate);
            run_crawl(config, fetcher, store, progress_sender, shutdown_receiver).await
        }
        None => run_crawl(config, fetcher, store, progress_sender, shutdown_receiver).await,
    };

    // Wait for progress task to complete (it will end when all senders are dropped)
    let _ = progress_handle.await;
    let elapsed = start_time.elapsed();

    match result {
        Ok(report) => {
            print_report(&report, &args.format)?;
            println!("Crawl completed in {:.2?}", elapsed);
            Ok(())
        }
        Err(gazette::Error::StoreUnavailable {
            consecutive_failures,
            last_error,
            report,
        }) => {
            print_report(&report, &args.format)?;
            Err(anyhow!(
                "Crawl aborted after {} consecutive failed writes: {}",
                consecutive_failures,
                last_error
            ))
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_crawl<F: PageFetcher>(
    config: CrawlConfig,
    fetcher: F,
    store: LibSqlStore,
    progress: mpsc::Sender<CrawlEvent>,
    shutdown: watch::Receiver<bool>,
) -> gazette::Result<RunReport> {
    Orchestrator::new(config, fetcher, store)
        .with_events(progress)
        .with_shutdown(shutdown)
        .run()
        .await
}

fn print_report(report: &RunReport, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

#[instrument]
async fn folders_command(args: FoldersArgs) -> anyhow::Result<()> {
    let config = catalog_config(&args.catalog);
    let fetcher = HttpFetcher::new(&config)?;

    let folders = discover_folders(&config, &fetcher).await?;
    info!(folders = folders.len(), "Catalog root listed");

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&folders)?);
        return Ok(());
    }

    if folders.is_empty() {
        println!("No folders found at {}", args.catalog.origin);
        return Ok(());
    }

    println!("{:<8} {:<40} Collection", "Folder", "Name");
    for folder in folders {
        println!("{:<8} {:<40} {}", folder.folder_id, folder.display_name, folder.collection);
    }

    Ok(())
}

#[instrument]
async fn count_command(args: CountArgs) -> anyhow::Result<()> {
    let store = LibSqlStore::open(&args.database.to_string_lossy()).await?;

    let collections = match args.collection {
        Some(collection) => vec![collection],
        None => store.collections().await?,
    };

    if collections.is_empty() {
        println!("No collections in {}", args.database.display());
        return Ok(());
    }

    for collection in collections {
        let count = store.count(&collection).await?;
        println!("{:<40} {}", collection, count);
    }

    Ok(())
}
