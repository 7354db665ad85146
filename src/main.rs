use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use tidings::ai::Summarizer;
use tidings::config::Config;
use tidings::export::ZoteroClient;
use tidings::ingest;
use tidings::scheduler::{Scheduler, Trigger};
use tidings::storage::{Database, EntryFilter, NewSource};
use tidings::sweeper;

/// Get the config directory path (~/.config/tidings/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("tidings"))
}

#[derive(Parser, Debug)]
#[command(name = "tidings", about = "Feed ingestion and entry lifecycle engine")]
struct Args {
    /// Config file path (default: ~/.config/tidings/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon: periodic fetches plus the daily retention sweep
    Run,
    /// Fetch all active sources once (or a single source by id)
    Fetch {
        #[arg(long)]
        source: Option<i64>,
    },
    /// Run the retention sweep once
    Cleanup,
    /// Register a feed source
    Add {
        name: String,
        url: String,
        /// Never retry with TLS verification disabled for this source
        #[arg(long)]
        strict_tls: bool,
    },
    /// Delete a source, preserving interested/favorite entries as orphans
    Remove { id: i64 },
    /// List registered sources with their counters
    List,
    /// List entries in reading order
    Entries {
        /// Restrict to one source
        #[arg(long)]
        source: Option<i64>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Re-randomize the reading order of unread entries
    Shuffle,
    /// Summarize and classify one entry with the configured AI backend
    Analyze { entry_id: i64 },
    /// Export one entry to Zotero
    Export { entry_id: i64 },
    /// Create a share link for a set of entries
    Share { entry_ids: Vec<i64> },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

    let config_path = args
        .config
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    let db_path = config
        .database_path
        .clone()
        .unwrap_or_else(|| config_dir.join("tidings.db").to_string_lossy().into_owned());
    let db = Database::open(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {db_path}"))?;
    let client = reqwest::Client::new();

    match args.command {
        Command::Run => run_daemon(db, client, config).await?,
        Command::Fetch { source } => fetch_once(&db, &client, source).await?,
        Command::Cleanup => {
            let report = sweeper::sweep(&db, &config.retention_policy()).await?;
            println!(
                "Deleted {} unread, {} trash; archived {}",
                report.deleted_unread, report.deleted_trash, report.archived
            );
        }
        Command::Add {
            name,
            url,
            strict_tls,
        } => {
            let mut new = NewSource::new(name, url);
            new.allow_ssl_bypass = !strict_tls;
            let source = db.create_source(&new).await?;
            println!("Added source {} ({})", source.id, source.name);
        }
        Command::Remove { id } => {
            let report = db.delete_source(id).await?;
            println!(
                "Removed source {id}: kept {} entries, deleted {}",
                report.preserved_entries, report.deleted_entries
            );
        }
        Command::List => {
            for s in db.list_sources(false).await? {
                let state = if s.is_active { "" } else { " (inactive)" };
                println!(
                    "{:>4}  {:<30} unread {:>4} / {:>4}  last fetch: {}{}",
                    s.id, s.name, s.unread_count, s.entry_count, s.last_fetch_status, state
                );
            }
        }
        Command::Entries { source, limit } => {
            let filter = EntryFilter {
                source_id: source,
                limit: Some(limit),
                ..Default::default()
            };
            for e in db.list_entries(&filter).await? {
                let read = if e.is_read { " " } else { "*" };
                println!(
                    "{:>5} {read} [{:<10}] {:<40} ({})",
                    e.id,
                    e.status.as_str(),
                    e.title,
                    e.source_name
                );
            }
        }
        Command::Shuffle => {
            let count = db.shuffle_unread().await?;
            println!("Shuffled {count} unread entries");
        }
        Command::Analyze { entry_id } => analyze_entry(&db, &config, entry_id).await?,
        Command::Export { entry_id } => export_entry(&db, &config, entry_id).await?,
        Command::Share { entry_ids } => {
            let share = db.create_share(&entry_ids, None, None).await?;
            println!("Share code: {}", share.code);
        }
    }

    Ok(())
}

async fn run_daemon(db: Database, client: reqwest::Client, config: Config) -> Result<()> {
    let mut scheduler = Scheduler::new();

    let fetch_db = db.clone();
    let fetch_client = client.clone();
    scheduler.register(
        "fetch",
        Trigger::Every(Duration::from_secs(config.fetch_interval_minutes.max(1) * 60)),
        move || {
            let db = fetch_db.clone();
            let client = fetch_client.clone();
            Box::pin(async move {
                let outcomes = ingest::ingest_all(&db, &client).await;
                let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
                if failed > 0 {
                    tracing::warn!(total = outcomes.len(), failed, "Fetch run had failures");
                }
                Ok(())
            })
        },
    );

    let sweep_db = db.clone();
    let policy = config.retention_policy();
    scheduler.register(
        "cleanup",
        Trigger::DailyAt {
            hour: config.cleanup_hour,
            minute: config.cleanup_minute,
        },
        move || {
            let db = sweep_db.clone();
            Box::pin(async move {
                sweeper::sweep(&db, &policy).await?;
                Ok(())
            })
        },
    );

    tracing::info!(
        fetch_interval_minutes = config.fetch_interval_minutes,
        cleanup_hour = config.cleanup_hour,
        "Daemon started"
    );
    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}

async fn fetch_once(db: &Database, client: &reqwest::Client, source: Option<i64>) -> Result<()> {
    match source {
        Some(id) => {
            let source = db
                .get_source(id)
                .await?
                .with_context(|| format!("No source with id {id}"))?;
            let stats = ingest::ingest_source(db, client, &source).await?;
            println!(
                "{}: {} fetched, {} new, {} reassociated",
                source.name, stats.fetched, stats.new, stats.reassociated
            );
        }
        None => {
            let outcomes = ingest::ingest_all(db, client).await;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(stats) => println!(
                        "source {}: {} new, {} reassociated",
                        outcome.source_id, stats.new, stats.reassociated
                    ),
                    Err(e) => println!("source {}: failed: {e}", outcome.source_id),
                }
            }
        }
    }
    Ok(())
}

async fn analyze_entry(db: &Database, config: &Config, entry_id: i64) -> Result<()> {
    let entry = db
        .get_entry(entry_id)
        .await?
        .with_context(|| format!("No entry with id {entry_id}"))?;

    let summarizer = Summarizer::new(&config.ai, config.ai_api_key());
    let analysis = summarizer
        .classify_and_summarize(&entry.title, &entry.source_name, entry.content.as_deref())
        .await;
    db.set_analysis(entry_id, &analysis.content_type, &analysis.summary)
        .await?;
    println!("[{}] {}", analysis.content_type, analysis.summary);
    Ok(())
}

async fn export_entry(db: &Database, config: &Config, entry_id: i64) -> Result<()> {
    let entry = db
        .get_entry(entry_id)
        .await?
        .with_context(|| format!("No entry with id {entry_id}"))?;
    let client = ZoteroClient::from_config(&config.zotero)
        .context("Zotero is not configured (library_id and api_key required)")?;

    match client.create_item(&entry).await {
        Some(key) => {
            db.mark_exported(entry_id, &key).await?;
            println!("Exported entry {entry_id} as {key}");
        }
        None => anyhow::bail!("Export failed, see logs"),
    }
    Ok(())
}
