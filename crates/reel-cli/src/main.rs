use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use reel_client::{BrowserOptions, BrowserPage, LocalStore};
use reel_core::{CrawlService, FieldTables, GuardConfig, RunInput, TracingCrawlReporter};
use reel_db::{Database, DatabaseConfig, RecordRepository};

#[derive(Parser)]
#[command(name = "reel", version, about = "Resilient YouTube listing and detail crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl listing pages and their video detail pages
    Crawl {
        /// JSON run input ({"startUrls": [...], "channel": ..., "maxVideos": ...})
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Start URL (repeatable, overrides startUrls from --input)
        #[arg(short, long = "url")]
        urls: Vec<String>,

        /// Channel handle or name; its /videos tab is crawled first
        #[arg(short, long, env = "REEL_CHANNEL")]
        channel: Option<String>,

        /// Maximum number of records to persist
        #[arg(short, long, env = "REEL_MAX_VIDEOS")]
        max_videos: Option<usize>,

        /// JSON file replacing the built-in field tables
        #[arg(short, long)]
        fields: Option<PathBuf>,

        /// Local storage directory for dataset items and the snapshot
        #[arg(long, env = "REEL_STORAGE_DIR", default_value = "./storage")]
        storage_dir: PathBuf,

        /// Also store records in PostgreSQL (requires DATABASE_URL)
        #[arg(long, default_value_t = false)]
        save: bool,

        /// Show the browser window
        #[arg(long, default_value_t = false)]
        headful: bool,

        /// Path to the Chrome/Chromium binary
        #[arg(long, env = "CHROME_BIN")]
        chrome_bin: Option<PathBuf>,

        /// Skip writing video_information.json at the end of the run
        #[arg(long, default_value_t = false)]
        no_snapshot: bool,

        /// Navigation timeout in seconds
        #[arg(long)]
        nav_timeout_secs: Option<u64>,

        /// Page readiness timeout in milliseconds
        #[arg(long)]
        ready_timeout_ms: Option<u64>,

        /// Per-candidate probe timeout in milliseconds
        #[arg(long)]
        probe_timeout_ms: Option<u64>,
    },

    /// Print the effective field tables as JSON
    Fields {
        /// JSON file replacing the built-in field tables
        #[arg(short, long)]
        fields: Option<PathBuf>,
    },

    /// Show records stored in PostgreSQL
    Records {
        /// Only show versions of this video URL
        #[arg(short, long)]
        url: Option<String>,

        /// Number of results to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("reel=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            input,
            urls,
            channel,
            max_videos,
            fields,
            storage_dir,
            save,
            headful,
            chrome_bin,
            no_snapshot,
            nav_timeout_secs,
            ready_timeout_ms,
            probe_timeout_ms,
        } => {
            let mut run_input = match &input {
                Some(path) => RunInput::from_file(path)?,
                None => RunInput::default(),
            };
            if !urls.is_empty() {
                run_input = run_input.with_start_urls(urls);
            }
            if let Some(channel) = channel {
                run_input = run_input.with_channel(channel);
            }
            if let Some(max_videos) = max_videos {
                run_input = run_input.with_max_videos(max_videos);
            }

            let mut guard = GuardConfig::default();
            if let Some(secs) = nav_timeout_secs {
                guard = guard.with_navigation_timeout(Duration::from_secs(secs));
            }
            if let Some(ms) = ready_timeout_ms {
                guard = guard.with_ready_timeout(Duration::from_millis(ms));
            }
            if let Some(ms) = probe_timeout_ms {
                guard = guard.with_probe_timeout(Duration::from_millis(ms));
            }

            let options = BrowserOptions::default().with_headless(!headful);
            let options = match chrome_bin {
                Some(bin) => options.with_chrome_bin(bin),
                None => options,
            };

            cmd_crawl(CrawlArgs {
                input: run_input,
                fields: load_tables(fields.as_deref())?,
                guard,
                storage_dir,
                save,
                snapshot: !no_snapshot,
                browser: options,
            })
            .await?;
        }
        Commands::Fields { fields } => {
            let tables = load_tables(fields.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&tables)?);
        }
        Commands::Records { url, limit } => {
            let repo = connect_db().await?;
            cmd_records(url.as_deref(), limit, &repo).await?;
        }
    }

    Ok(())
}

struct CrawlArgs {
    input: RunInput,
    fields: FieldTables,
    guard: GuardConfig,
    storage_dir: PathBuf,
    save: bool,
    snapshot: bool,
    browser: BrowserOptions,
}

/// Connect to PostgreSQL using DATABASE_URL and bring the schema up to date.
async fn connect_db() -> Result<RecordRepository> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db.record_repo())
}

/// Built-in tables, or the override file when one is given.
fn load_tables(path: Option<&Path>) -> Result<FieldTables> {
    let tables = match path {
        Some(path) => FieldTables::load(path)
            .with_context(|| format!("Failed to load field tables: {}", path.display()))?,
        None => FieldTables::default(),
    };
    tables.validate()?;
    Ok(tables)
}

async fn cmd_crawl(args: CrawlArgs) -> Result<()> {
    // Everything that can be rejected is checked before Chromium starts.
    let plan = args.input.into_plan()?;
    plan.validate()?;

    let repo = if args.save {
        Some(connect_db().await?)
    } else {
        None
    };
    if let Some(repo) = &repo {
        tracing::info!(run_id = %repo.run_id(), "Storing records in PostgreSQL");
    }

    let store = LocalStore::new(&args.storage_dir);
    tracing::info!(
        seeds = plan.seeds.len(),
        max_items = plan.max_items,
        storage = %store.root().display(),
        "Starting crawl"
    );

    let page = BrowserPage::launch(args.browser).await?;

    let mut service = CrawlService::new(page, (store, repo), args.fields).with_guard(args.guard);
    if !args.snapshot {
        service = service.without_snapshot();
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing current page");
            on_signal.cancel();
        }
    });

    let summary = service.run(&plan, &cancel, &TracingCrawlReporter).await?;

    tracing::info!(
        persisted = summary.persisted,
        visited = summary.visited,
        faults = summary.faults,
        cancelled = summary.cancelled,
        "Crawl complete"
    );

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

async fn cmd_records(url: Option<&str>, limit: usize, repo: &RecordRepository) -> Result<()> {
    let records = match url {
        Some(url) => {
            let canonical = reel_core::canonical::canonicalize(url)?;
            repo.history(&canonical, limit).await?
        }
        None => repo.latest(limit).await?,
    };

    if records.is_empty() {
        match url {
            Some(url) => println!("No records found for {url}"),
            None => println!("No records stored yet"),
        }
        return Ok(());
    }

    for (i, stored) in records.iter().enumerate() {
        let changed = url.is_none()
            || records
                .get(i + 1)
                .is_none_or(|older| older.data_hash != stored.data_hash);
        let status = if changed { "CHANGED" } else { "unchanged" };

        println!(
            "  [{}] {} {} (run: {}, fields: {}, hash: {}...)",
            status,
            stored.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            stored.canonical_url,
            stored.run_id,
            stored.record.resolved_count(),
            &stored.data_hash[..8],
        );
        if let Some(title) = &stored.record.title {
            println!("        {title}");
        }
    }

    println!("\nTotal: {} records", records.len());

    Ok(())
}
