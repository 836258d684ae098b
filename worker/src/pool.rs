//! Parallel ingestion. Each worker thread owns its own archive connection
//! and pulls sources off a shared queue; the archive serializes the writes.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use list_archive_core::config::ArchiveConfig;
use list_archive_core::diagnostics::{log_rejection, Rejection};
use list_archive_core::{open_archive_with, CoreError, IndexNotifier, Ingestor, ListDirectory, RawMessage};

use crate::sources::Source;

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Summary {
    pub processed: u64,
    pub rejected: u64,
    pub elapsed_ms: u128,
}

pub fn run(
    config: &ArchiveConfig,
    directory: &dyn ListDirectory,
    notifier: &dyn IndexNotifier,
    list: &str,
    sources: Vec<Source>,
    jobs: usize,
) -> anyhow::Result<Summary> {
    let start = Instant::now();
    let jobs = jobs.clamp(1, sources.len().max(1));
    let queue = Mutex::new(sources.into_iter().rev().collect::<Vec<_>>());
    let counters = Counters::default();

    // open every connection up front so a bad path fails before any work starts
    let mut conns = Vec::with_capacity(jobs);
    for _ in 0..jobs {
        conns.push(open_archive_with(&config.storage.path, &config.storage)?.conn);
    }

    thread::scope(|scope| {
        for (worker, mut conn) in conns.into_iter().enumerate() {
            let queue = &queue;
            let counters = &counters;
            scope.spawn(move || {
                let ingestor = Ingestor::new(directory, notifier).with_config(&config.ingest);
                loop {
                    let next = match queue.lock() {
                        Ok(mut pending) => pending.pop(),
                        Err(_) => None,
                    };
                    let Some(source) = next else { break };
                    let raw = RawMessage::parse(&source.bytes);
                    match ingestor.ingest(&mut conn, list, &raw) {
                        Ok(_) => {
                            counters.processed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            counters.rejected.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(worker, source = %source.label, error = %err, "rejected message");
                            dead_letter(config, list, &source, &raw, &err);
                        }
                    }
                }
                tracing::debug!(worker, "ingest worker finished");
            });
        }
    });

    Ok(Summary {
        processed: counters.processed.load(Ordering::Relaxed),
        rejected: counters.rejected.load(Ordering::Relaxed),
        elapsed_ms: start.elapsed().as_millis(),
    })
}

fn dead_letter(config: &ArchiveConfig, list: &str, source: &Source, raw: &RawMessage, err: &CoreError) {
    let Some(dir) = config.diagnostics.dead_letter_dir.as_deref() else {
        return;
    };
    let rejection = Rejection::new(list, &source.label, raw.header_text("Message-ID"), err);
    if let Err(io_err) = log_rejection(Path::new(dir), &rejection) {
        tracing::error!(error = %io_err, "failed to write dead-letter log");
    }
}
