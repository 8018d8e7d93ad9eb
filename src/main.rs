mod api;
mod batch;
mod collector;
mod db;
mod error;
mod extract;
mod identifiers;
mod model;
mod normalize;
mod output;
mod paginator;
mod settings;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use api::YouTubeClient;
use batch::BatchRunner;
use collector::Collector;
use error::BatchSetupError;
use model::RunSummary;
use output::{CsvWriter, LogFileSink, RecordWriter};
use paginator::PaginationLimits;
use settings::{OutputFormat, RunPaths, Settings};

#[derive(Parser)]
#[command(name = "yt_comments", about = "Collect comments and replies for trending YouTube videos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect comments + replies for every video in the day's trending list
    Collect {
        /// Comma-separated video ids (skips the trending CSV)
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
        /// Trending CSV with a video_id column (default: <base_dir>/trending/<date>.csv)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Run date, YYYYMMDD (default: today)
        #[arg(long, value_parser = settings::parse_run_date)]
        date: Option<String>,
        /// Only collect the first N videos
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Max top-level comments kept per video
        #[arg(long)]
        max_comments: Option<usize>,
        /// Comments requested per page (1-100)
        #[arg(long)]
        page_size: Option<usize>,
        /// Videos collected at the same time
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
        /// Where records go
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Show recorded runs from the SQLite store
    Stats {
        /// Only runs for this date, YYYYMMDD
        #[arg(long, value_parser = settings::parse_run_date)]
        date: Option<String>,
        /// Max runs to display
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

struct CollectArgs {
    ids: Vec<String>,
    input: Option<PathBuf>,
    date: String,
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let loaded = Settings::load();

    let result = match cli.command {
        Commands::Collect {
            ids,
            input,
            date,
            limit,
            max_comments,
            page_size,
            concurrency,
            format,
        } => {
            let date = date.unwrap_or_else(settings::today);
            let mut settings = match loaded {
                Ok(s) => s,
                Err(e) => {
                    let paths = RunPaths::new(&Settings::load_base_dir(), &date);
                    record_abort(&paths, &date, &e);
                    return Err(e);
                }
            };
            if let Some(n) = max_comments {
                settings.max_comments = n;
            }
            if let Some(n) = page_size {
                settings.page_size = n;
            }
            if let Some(n) = concurrency {
                settings.concurrency = n;
            }
            if let Some(f) = format {
                settings.format = f;
            }
            info!(settings = ?settings, "Starting comment collection");

            let paths = settings.paths(&date);
            let args = CollectArgs {
                ids,
                input,
                date: date.clone(),
                limit,
            };

            match collect(&settings, &paths, args).await {
                Ok(summary) => {
                    print_summary(&summary);
                    Ok(())
                }
                Err(e) => {
                    record_abort(&paths, &date, &e);
                    Err(e)
                }
            }
        }
        Commands::Stats { date, limit } => {
            let settings = loaded?;
            let db_path = settings.db_path();
            if !db_path.exists() {
                println!("No store at {:?}. Runs are recorded with --format sqlite.", db_path);
                return Ok(());
            }
            let conn = db::connect(&db_path)?;
            let runs = db::fetch_runs(&conn, date.as_deref(), limit)?;
            if runs.is_empty() {
                println!("No runs recorded.");
                return Ok(());
            }

            println!(
                "{:>4} | {:<8} | {:<19} | {:>6} | {:>8} | {:>8} | {:>7} | {:>8}",
                "#", "Date", "Started", "Videos", "Comments", "Replies", "Failed", "Elapsed"
            );
            println!("{}", "-".repeat(90));
            for r in &runs {
                println!(
                    "{:>4} | {:<8} | {:<19} | {:>6} | {:>8} | {:>8} | {:>7} | {:>8}",
                    r.id,
                    r.run_date,
                    r.started_at,
                    format!("{}/{}", r.written, r.identifiers),
                    r.total_comments,
                    r.total_replies,
                    r.failed,
                    format_duration(Duration::from_millis(r.elapsed_ms.max(0) as u64)),
                );
            }

            let with_failures: Vec<_> = runs.iter().filter(|r| r.failed > 0).collect();
            if !with_failures.is_empty() {
                println!("\n--- Failures ---");
                for r in with_failures {
                    for (video_id, error) in db::fetch_failures(&conn, r.id)? {
                        println!("  run {}: {}: {}", r.id, video_id, error);
                    }
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Everything up to `run_all` is setup: any error here aborts the run
/// without a summary.
async fn collect(settings: &Settings, paths: &RunPaths, args: CollectArgs) -> anyhow::Result<RunSummary> {
    let mut identifiers = if args.ids.is_empty() {
        let source = args.input.unwrap_or_else(|| paths.trending_csv.clone());
        identifiers::read_trending_csv(&source)?
    } else {
        identifiers::dedupe(args.ids)
    };
    if let Some(n) = args.limit {
        identifiers.truncate(n);
    }

    let api_key = settings.api_key().ok_or(BatchSetupError::MissingApiKey)?;
    let client = YouTubeClient::new(
        &settings.api_base_url,
        &api_key,
        Duration::from_secs(settings.request_timeout_secs),
    )
    .map_err(|e| BatchSetupError::Client(e.to_string()))?;

    let mut limits = PaginationLimits::new(settings.max_comments, settings.page_size);
    if let Some(n) = settings.max_fetch_attempts {
        limits = limits.with_max_fetches(n);
    }

    output::ensure_writable_dir(&paths.log_dir)?;
    let writer: Box<dyn RecordWriter> = match settings.format {
        OutputFormat::Csv => Box::new(CsvWriter::new(&paths.comments_dir)?),
        OutputFormat::Sqlite => {
            let conn = db::connect(&settings.db_path())?;
            Box::new(db::SqliteStore::new(conn, &args.date))
        }
    };
    let sink = Box::new(LogFileSink::new(&paths.log_file));

    let collector = Collector::new(Arc::new(client), limits);
    println!(
        "Collecting {} videos (max {} comments each, {} per page, {} at a time)...",
        identifiers.len(),
        collector.limits().cap,
        collector.limits().page_size,
        settings.concurrency.max(1)
    );

    let mut runner = BatchRunner::new(collector, writer, sink, &args.date)
        .with_concurrency(settings.concurrency);
    let summary = runner.run_all(&identifiers).await;
    Ok(summary)
}

fn record_abort(paths: &RunPaths, date: &str, error: &anyhow::Error) {
    if let Err(log_err) = output::write_abort(&paths.log_file, date, error) {
        warn!("Could not record abort in run log: {:#}", log_err);
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Collected {} comments, {} replies from {} of {} videos in {}.",
        summary.total_top_level,
        summary.total_child,
        summary.written,
        summary.identifiers,
        format_duration(summary.elapsed)
    );
    if !summary.failed.is_empty() {
        println!("Failed videos: {}", summary.failed.len());
        for f in &summary.failed {
            println!("  - {}: {}", f.identifier, f.error);
        }
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
