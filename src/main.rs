//! CLI entry point: a thin driver around [`QueueManager`].
//!
//! Parses arguments, loads the persisted queue/download state, optionally
//! upserts the target queue's concurrency/time-window, enqueues any URLs
//! given on the command line (or piped via stdin), then runs the
//! admission loop and connectivity monitor until the newly added
//! downloads reach a terminal status (or the process is interrupted).
//! The interactive terminal UI this would normally feed is out of scope
//! (spec.md §1); this binary only exercises the core engine.

use std::collections::HashSet;
use std::io::{self, IsTerminal, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fetchqueue_core::download::{
    DEFAULT_QUEUE_NAME, DownloadStatus, MAX_QUEUE_NAME_LEN, normalize_queue_name, resolve_unique_path,
};
use fetchqueue_core::network::NetworkMonitor;
use fetchqueue_core::queue::{DEFAULT_MAX_CONCURRENT, QueueConfig, parse_hhmm};
use fetchqueue_core::{Database, DescriptorConfig, QueueManager};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("fetchqueue starting");

    let urls = collect_urls(&args)?;
    if urls.is_empty() {
        info!("No URLs provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://example.com/file.pdf' | fetchqueue");
        return Ok(());
    }

    let db = Database::new(&args.db)
        .await
        .with_context(|| format!("opening database at {}", args.db.display()))?;
    let manager = QueueManager::load(db).await.context("loading queue manager state")?;

    if args.concurrency.is_some() || args.window_start.is_some() {
        upsert_queue_from_args(&manager, &args).await?;
    }

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("creating output directory {}", args.output_dir.display()))?;

    let monitor = NetworkMonitor::new_default();
    monitor.start().await;

    let admission_loop = tokio::spawn(manager.clone().run());

    let mut added = Vec::with_capacity(urls.len());
    for url in &urls {
        match enqueue(&manager, &args, url).await {
            Ok(()) => added.push(url.clone()),
            Err(e) => warn!(url, error = %e, "failed to enqueue"),
        }
    }

    if added.is_empty() {
        admission_loop.abort();
        monitor.stop().await;
        return Ok(());
    }

    if !args.no_wait {
        wait_for_terminal(&manager, &added).await;
    }

    let completed = added
        .iter()
        .filter(|url| {
            manager
                .snapshots()
                .iter()
                .any(|s| &s.url == *url && s.status == DownloadStatus::Completed)
        })
        .count();
    info!(completed, total = added.len(), "fetchqueue run finished");

    admission_loop.abort();
    monitor.stop().await;
    Ok(())
}

/// Reads URLs from positional args, falling back to stdin (one per
/// line) when none were given and stdin isn't an interactive terminal.
fn collect_urls(args: &Args) -> Result<Vec<String>> {
    if !args.urls.is_empty() {
        return Ok(args.urls.clone());
    }
    if io::stdin().is_terminal() {
        return Ok(Vec::new());
    }
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

async fn upsert_queue_from_args(manager: &QueueManager, args: &Args) -> Result<()> {
    let mut cfg = manager
        .queue_config(&args.queue)
        .unwrap_or_else(|| QueueConfig::new(&args.queue, DEFAULT_MAX_CONCURRENT));
    if let Some(concurrency) = args.concurrency {
        cfg.max_concurrent = concurrency.max(1);
    }
    if let (Some(start), Some(end)) = (&args.window_start, &args.window_end) {
        cfg.start_time = parse_hhmm(start).with_context(|| format!("invalid --window-start {start}"))?;
        cfg.end_time = parse_hhmm(end).with_context(|| format!("invalid --window-end {end}"))?;
    }
    manager.upsert_queue(cfg).await.context("saving queue configuration")?;
    Ok(())
}

async fn enqueue(manager: &QueueManager, args: &Args, url: &str) -> Result<()> {
    let queue_name = normalize_queue_name(&args.queue, MAX_QUEUE_NAME_LEN)
        .unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string());
    let filename = url
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("download.bin");
    let target = resolve_unique_path(&args.output_dir, filename);

    let cfg = DescriptorConfig {
        queue: Some(queue_name),
        max_bandwidth_kbps: args.max_bandwidth_kbps,
        max_retries: Some(args.max_retries),
        retry_delay: Some(Duration::from_secs(args.retry_delay_secs)),
        scheduled_start_time: None,
    };

    manager.add_url(url, target, cfg).await?;
    debug!(url, "enqueued");
    Ok(())
}

/// Polls descriptor snapshots until every URL in `urls` reaches a
/// terminal status, or the process receives an interrupt signal.
async fn wait_for_terminal(manager: &QueueManager, urls: &[String]) {
    let mut pending: HashSet<&str> = urls.iter().map(String::as_str).collect();
    let mut last_status: std::collections::HashMap<String, DownloadStatus> = std::collections::HashMap::new();

    loop {
        if pending.is_empty() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(500)) => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, exiting without waiting for remaining downloads");
                return;
            }
        }

        for snapshot in manager.snapshots() {
            if !pending.contains(snapshot.url.as_str()) {
                continue;
            }
            if last_status.get(&snapshot.url) != Some(&snapshot.status) {
                info!(
                    url = %snapshot.url,
                    status = ?snapshot.status,
                    downloaded = snapshot.downloaded,
                    total_size = snapshot.total_size,
                    "status changed"
                );
                last_status.insert(snapshot.url.clone(), snapshot.status);
            }
            if snapshot.status.is_terminal() || snapshot.status == DownloadStatus::Error {
                pending.remove(snapshot.url.as_str());
            }
        }
    }
}
