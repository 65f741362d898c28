//! `sqlx`-backed persistence for queue configurations and download
//! descriptors, against the schema in `migrations/0001_init.sql`.
//!
//! Grounded in the teacher's `db.rs` query style (raw `sqlx::query` +
//! `Row::get`, upserts via `ON CONFLICT`) rather than `query_as`, since
//! [`QueueConfig`]'s `NaiveTime` fields and [`DescriptorSnapshot`]'s
//! `DateTime<Utc>` fields need custom conversion to/from the `TEXT`
//! columns actually stored.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::instrument;

use crate::db::Database;
use crate::download::{DescriptorSnapshot, DownloadStatus};

use super::config::{QueueConfig, format_hhmm, parse_hhmm};
use super::error::QueueError;

/// Loads every persisted queue configuration. The seed migration
/// guarantees `"default"` is always present.
#[instrument(skip(db))]
pub async fn load_queues(db: &Database) -> Result<Vec<QueueConfig>, QueueError> {
    let rows = sqlx::query("SELECT name, enabled, max_concurrent, start_time, end_time FROM queues")
        .fetch_all(db.pool())
        .await?;

    Ok(rows.into_iter().map(row_to_queue).collect())
}

fn row_to_queue(row: SqliteRow) -> QueueConfig {
    let enabled: i64 = row.get("enabled");
    let max_concurrent: i64 = row.get("max_concurrent");
    let start_time: String = row.get("start_time");
    let end_time: String = row.get("end_time");

    QueueConfig {
        name: row.get("name"),
        enabled: enabled != 0,
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        max_concurrent: max_concurrent.max(1) as u32,
        start_time: parse_hhmm(&start_time).unwrap_or_else(default_start),
        end_time: parse_hhmm(&end_time).unwrap_or_else(default_end),
    }
}

#[allow(clippy::unwrap_used)]
fn default_start() -> chrono::NaiveTime {
    parse_hhmm("00:00").unwrap()
}

#[allow(clippy::unwrap_used)]
fn default_end() -> chrono::NaiveTime {
    parse_hhmm("23:59").unwrap()
}

/// Inserts or updates a queue configuration.
#[instrument(skip(db, cfg), fields(queue = %cfg.name))]
pub async fn save_queue(db: &Database, cfg: &QueueConfig) -> Result<(), QueueError> {
    sqlx::query(
        "INSERT INTO queues (name, enabled, max_concurrent, start_time, end_time)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET
            enabled = excluded.enabled,
            max_concurrent = excluded.max_concurrent,
            start_time = excluded.start_time,
            end_time = excluded.end_time",
    )
    .bind(&cfg.name)
    .bind(i64::from(cfg.enabled))
    .bind(i64::from(cfg.max_concurrent))
    .bind(format_hhmm(cfg.start_time))
    .bind(format_hhmm(cfg.end_time))
    .execute(db.pool())
    .await?;
    Ok(())
}

/// Loads every persisted download, ordered by `rowid` so insertion
/// (FIFO admission) order is preserved within each queue.
#[instrument(skip(db))]
pub async fn load_downloads(db: &Database) -> Result<Vec<DescriptorSnapshot>, QueueError> {
    let rows = sqlx::query(
        "SELECT url, target_path, filename, queue, max_bandwidth_kbps, max_retries,
                retry_delay_secs, scheduled_start_time, downloaded, total_size, status,
                error_message, retry_count, start_time, completion_time, supports_ranges
         FROM downloads ORDER BY rowid ASC",
    )
    .fetch_all(db.pool())
    .await?;

    Ok(rows.into_iter().map(row_to_snapshot).collect())
}

fn row_to_snapshot(row: SqliteRow) -> DescriptorSnapshot {
    let downloaded: i64 = row.get("downloaded");
    let total_size: i64 = row.get("total_size");
    #[allow(clippy::cast_sign_loss)]
    let downloaded = downloaded.max(0) as u64;
    #[allow(clippy::cast_sign_loss)]
    let total_size = total_size.max(0) as u64;
    #[allow(clippy::cast_precision_loss)]
    let progress = if total_size > 0 {
        downloaded as f64 / total_size as f64 * 100.0
    } else {
        0.0
    };

    let status: String = row.get("status");
    let max_bandwidth_kbps: i64 = row.get("max_bandwidth_kbps");
    let max_retries: i64 = row.get("max_retries");
    let retry_delay_secs: i64 = row.get("retry_delay_secs");
    let retry_count: i64 = row.get("retry_count");
    let supports_ranges: i64 = row.get("supports_ranges");

    #[allow(clippy::cast_sign_loss)]
    DescriptorSnapshot {
        url: row.get("url"),
        target_path: PathBuf::from(row.get::<String, _>("target_path")),
        filename: row.get("filename"),
        queue: row.get("queue"),
        max_bandwidth_kbps: max_bandwidth_kbps.max(0) as u64,
        max_retries: max_retries.max(0) as u32,
        retry_delay_secs: retry_delay_secs.max(0) as u64,
        scheduled_start_time: row
            .get::<Option<String>, _>("scheduled_start_time")
            .and_then(|s| parse_datetime(&s)),
        downloaded,
        total_size,
        progress,
        speed: 0,
        status: parse_status(&status),
        error_message: row.get("error_message"),
        retry_count: retry_count.max(0) as u32,
        start_time: row
            .get::<Option<String>, _>("start_time")
            .and_then(|s| parse_datetime(&s)),
        completion_time: row
            .get::<Option<String>, _>("completion_time")
            .and_then(|s| parse_datetime(&s)),
        supports_ranges: supports_ranges != 0,
    }
}

fn parse_status(s: &str) -> DownloadStatus {
    match s {
        "downloading" => DownloadStatus::Downloading,
        "paused" => DownloadStatus::Paused,
        "completed" => DownloadStatus::Completed,
        "error" => DownloadStatus::Error,
        "cancelled" => DownloadStatus::Cancelled,
        _ => DownloadStatus::Pending,
    }
}

fn status_str(status: DownloadStatus) -> &'static str {
    match status {
        DownloadStatus::Pending => "pending",
        DownloadStatus::Downloading => "downloading",
        DownloadStatus::Paused => "paused",
        DownloadStatus::Completed => "completed",
        DownloadStatus::Error => "error",
        DownloadStatus::Cancelled => "cancelled",
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Inserts or updates a download's persisted snapshot.
#[instrument(skip(db, snap), fields(url = %snap.url))]
pub async fn save_download(db: &Database, snap: &DescriptorSnapshot) -> Result<(), QueueError> {
    sqlx::query(
        "INSERT INTO downloads (
            url, target_path, filename, queue, max_bandwidth_kbps, max_retries,
            retry_delay_secs, scheduled_start_time, downloaded, total_size, status,
            error_message, retry_count, start_time, completion_time, supports_ranges
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(url) DO UPDATE SET
            target_path = excluded.target_path,
            filename = excluded.filename,
            queue = excluded.queue,
            max_bandwidth_kbps = excluded.max_bandwidth_kbps,
            max_retries = excluded.max_retries,
            retry_delay_secs = excluded.retry_delay_secs,
            scheduled_start_time = excluded.scheduled_start_time,
            downloaded = excluded.downloaded,
            total_size = excluded.total_size,
            status = excluded.status,
            error_message = excluded.error_message,
            retry_count = excluded.retry_count,
            start_time = excluded.start_time,
            completion_time = excluded.completion_time,
            supports_ranges = excluded.supports_ranges",
    )
    .bind(&snap.url)
    .bind(snap.target_path.to_string_lossy().to_string())
    .bind(&snap.filename)
    .bind(&snap.queue)
    .bind(i64::try_from(snap.max_bandwidth_kbps).unwrap_or(i64::MAX))
    .bind(i64::from(snap.max_retries))
    .bind(i64::try_from(snap.retry_delay_secs).unwrap_or(i64::MAX))
    .bind(snap.scheduled_start_time.map(|t| t.to_rfc3339()))
    .bind(i64::try_from(snap.downloaded).unwrap_or(i64::MAX))
    .bind(i64::try_from(snap.total_size).unwrap_or(i64::MAX))
    .bind(status_str(snap.status))
    .bind(&snap.error_message)
    .bind(i64::from(snap.retry_count))
    .bind(snap.start_time.map(|t| t.to_rfc3339()))
    .bind(snap.completion_time.map(|t| t.to_rfc3339()))
    .bind(i64::from(snap.supports_ranges))
    .execute(db.pool())
    .await?;
    Ok(())
}

/// Deletes a download's persisted row. A no-op if the URL isn't tracked.
#[instrument(skip(db))]
pub async fn delete_download(db: &Database, url: &str) -> Result<(), QueueError> {
    sqlx::query("DELETE FROM downloads WHERE url = ?")
        .bind(url)
        .execute(db.pool())
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_queues_includes_seeded_default() {
        let db = Database::new_in_memory().await.unwrap();
        let queues = load_queues(&db).await.unwrap();
        assert!(queues.iter().any(|q| q.name == "default"));
    }

    #[tokio::test]
    async fn test_save_and_load_queue_roundtrip() {
        let db = Database::new_in_memory().await.unwrap();
        let cfg = QueueConfig {
            start_time: parse_hhmm("22:00").unwrap(),
            end_time: parse_hhmm("02:00").unwrap(),
            ..QueueConfig::new("nightly", 3)
        };
        save_queue(&db, &cfg).await.unwrap();

        let queues = load_queues(&db).await.unwrap();
        let reloaded = queues.iter().find(|q| q.name == "nightly").unwrap();
        assert_eq!(reloaded.max_concurrent, 3);
        assert_eq!(reloaded.start_time, cfg.start_time);
        assert_eq!(reloaded.end_time, cfg.end_time);
    }

    #[tokio::test]
    async fn test_save_and_load_download_roundtrip() {
        let db = Database::new_in_memory().await.unwrap();
        let mut snap = DescriptorSnapshot {
            url: "https://example.com/f.bin".to_string(),
            target_path: PathBuf::from("/tmp/f.bin"),
            filename: "f.bin".to_string(),
            queue: "default".to_string(),
            max_bandwidth_kbps: 100,
            max_retries: 3,
            retry_delay_secs: 5,
            scheduled_start_time: None,
            downloaded: 50,
            total_size: 100,
            progress: 50.0,
            speed: 0,
            status: DownloadStatus::Paused,
            error_message: None,
            retry_count: 1,
            start_time: Some(Utc::now()),
            completion_time: None,
            supports_ranges: true,
        };
        save_download(&db, &snap).await.unwrap();

        let loaded = load_downloads(&db).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].url, snap.url);
        assert_eq!(loaded[0].downloaded, 50);
        assert_eq!(loaded[0].status, DownloadStatus::Paused);
        assert!(loaded[0].supports_ranges);

        snap.status = DownloadStatus::Completed;
        snap.downloaded = 100;
        save_download(&db, &snap).await.unwrap();
        let loaded = load_downloads(&db).await.unwrap();
        assert_eq!(loaded.len(), 1, "upsert should not duplicate rows");
        assert_eq!(loaded[0].status, DownloadStatus::Completed);
    }

    #[tokio::test]
    async fn test_delete_download() {
        let db = Database::new_in_memory().await.unwrap();
        let snap = DescriptorSnapshot {
            url: "https://example.com/g.bin".to_string(),
            target_path: PathBuf::from("/tmp/g.bin"),
            filename: "g.bin".to_string(),
            queue: "default".to_string(),
            max_bandwidth_kbps: 0,
            max_retries: 3,
            retry_delay_secs: 5,
            scheduled_start_time: None,
            downloaded: 0,
            total_size: 0,
            progress: 0.0,
            speed: 0,
            status: DownloadStatus::Pending,
            error_message: None,
            retry_count: 0,
            start_time: None,
            completion_time: None,
            supports_ranges: false,
        };
        save_download(&db, &snap).await.unwrap();
        delete_download(&db, &snap.url).await.unwrap();
        let loaded = load_downloads(&db).await.unwrap();
        assert!(loaded.is_empty());
    }
}
