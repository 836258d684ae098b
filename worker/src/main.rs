//! Command-line worker for the list archive.

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};

use list_archive_core::config::{load_config, load_config_from, ArchiveConfig};
use list_archive_core::diagnostics::read_rejections;
use list_archive_core::query::{
    archive_stats, list_thread_messages, list_thread_messages_by_reply, thread_chain,
    thread_summary, top_posters,
};
use list_archive_core::{open_archive_with, ListDirectory, NoopNotifier, StaticDirectory};

mod pool;
mod sources;

#[derive(Parser)]
#[command(name = "list-archive", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (default: $LIST_ARCHIVE_CONFIG)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Archive database, overriding the config file
    #[arg(long, global = true, value_name = "FILE")]
    archive: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest .eml files, mbox files or directories of them into a list
    Ingest {
        #[arg(short, long)]
        list: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Parallel workers, each with its own connection
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
        #[arg(long)]
        json: bool,
    },
    /// Row counts for the whole archive
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Threads of a list from least to most recently active
    Chain {
        #[arg(short, long)]
        list: String,
        #[arg(long)]
        json: bool,
    },
    /// Messages of one thread, as a reply tree or by date
    Thread {
        #[arg(short, long)]
        list: String,
        thread_id: String,
        #[arg(long)]
        by_date: bool,
    },
    /// Most active senders of a list
    TopPosters {
        #[arg(short, long)]
        list: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Messages recorded in the dead-letter log
    Rejections,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(level);

    let mut config = match cli.config.as_deref() {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(archive) = cli.archive {
        config.storage.path = archive;
    }

    match cli.command {
        Commands::Ingest {
            list,
            paths,
            jobs,
            json,
        } => cmd_ingest(&config, &list, &paths, jobs, json),
        Commands::Stats { json } => cmd_stats(&config, json),
        Commands::Chain { list, json } => cmd_chain(&config, &list, json),
        Commands::Thread {
            list,
            thread_id,
            by_date,
        } => cmd_thread(&config, &list, &thread_id, by_date),
        Commands::TopPosters { list, limit } => cmd_top_posters(&config, &list, limit),
        Commands::Rejections => cmd_rejections(&config),
    }
}

fn setup_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_ingest(
    config: &ArchiveConfig,
    list: &str,
    paths: &[PathBuf],
    jobs: usize,
    json: bool,
) -> anyhow::Result<()> {
    let directory = StaticDirectory::from_configs(&config.lists);
    if directory.get_list(list).is_none() {
        bail!("list {} is not configured", list);
    }
    let sources = sources::load_sources(paths)?;
    tracing::info!(list, messages = sources.len(), jobs, "starting ingestion");

    let summary = pool::run(config, &directory, &NoopNotifier, list, sources, jobs)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} processed, {} rejected in {} ms",
            summary.processed, summary.rejected, summary.elapsed_ms
        );
    }
    Ok(())
}

fn cmd_stats(config: &ArchiveConfig, json: bool) -> anyhow::Result<()> {
    let db = open_archive_with(&config.storage.path, &config.storage)?;
    let stats = archive_stats(&db.conn)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Archive:     {}", db.path.display());
        println!("Lists:       {}", stats.lists);
        println!("Threads:     {}", stats.threads);
        println!("Messages:    {}", stats.messages);
        println!("Senders:     {}", stats.senders);
        println!("Attachments: {}", stats.attachments);
    }
    Ok(())
}

fn cmd_chain(config: &ArchiveConfig, list: &str, json: bool) -> anyhow::Result<()> {
    let db = open_archive_with(&config.storage.path, &config.storage)?;
    let chain = thread_chain(&db.conn, list)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&chain)?);
        return Ok(());
    }
    for thread in &chain {
        println!(
            "{}  {}  {:>4} msgs",
            thread.date_active.format("%Y-%m-%d %H:%M:%S"),
            thread.thread_id,
            thread.message_count
        );
    }
    Ok(())
}

fn cmd_thread(
    config: &ArchiveConfig,
    list: &str,
    thread_id: &str,
    by_date: bool,
) -> anyhow::Result<()> {
    let db = open_archive_with(&config.storage.path, &config.storage)?;
    let summary = thread_summary(&db.conn, list, thread_id, Utc::now())?
        .with_context(|| format!("no thread {} in {}", thread_id, list))?;
    println!("{}", summary.subject);
    println!(
        "{} messages, {} participants, started {} days ago, inactive for {} days",
        summary.thread.message_count,
        summary.participants.len(),
        summary.days_old,
        summary.days_inactive
    );
    let messages = if by_date {
        list_thread_messages(&db.conn, summary.thread.id)?
    } else {
        list_thread_messages_by_reply(&db.conn, summary.thread.id)?
    };
    for message in messages {
        let indent = if by_date { 0 } else { message.thread_depth.clamp(0, 5) as usize };
        println!(
            "{}{}  <{}>  {}",
            "  ".repeat(indent),
            message.date.format("%Y-%m-%d %H:%M"),
            message.sender_address,
            message.subject
        );
    }
    Ok(())
}

fn cmd_top_posters(config: &ArchiveConfig, list: &str, limit: i64) -> anyhow::Result<()> {
    let db = open_archive_with(&config.storage.path, &config.storage)?;
    for (rank, poster) in top_posters(&db.conn, list, limit)?.iter().enumerate() {
        println!("{:>3}. {:>5}  {} <{}>", rank + 1, poster.count, poster.name, poster.address);
    }
    Ok(())
}

fn cmd_rejections(config: &ArchiveConfig) -> anyhow::Result<()> {
    let Some(dir) = config.diagnostics.dead_letter_dir.as_deref() else {
        bail!("no dead_letter_dir configured");
    };
    for rejection in read_rejections(dir)? {
        println!("{}\t{}\t{}\t{}", rejection.ts, rejection.list, rejection.kind, rejection.source);
    }
    Ok(())
}
