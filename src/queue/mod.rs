//! `QueueManager`: named queues, admission control, and descriptor
//! persistence.
//!
//! Grounded in `original_source/internal/queue/manager.go`'s `Manager`: a
//! mutex-guarded `downloads` map plus per-queue `activeJobs` counters,
//! driven by a periodic admission tick (spec.md §4.3, 60s cadence per
//! SPEC_FULL.md §4.3) and explicit `process_all()` triggers from URL
//! additions. The manager mutex is a plain [`std::sync::Mutex`] and is
//! never held across a worker's `start()` or any network I/O (spec.md
//! §5 ordering rule).

mod config;
mod error;
mod persistence;

pub use config::{DEFAULT_MAX_CONCURRENT, QueueConfig, format_hhmm, parse_hhmm};
pub use error::{QueueDbErrorKind, QueueError};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::db::Database;
use crate::download::{Descriptor, DescriptorConfig, DescriptorSnapshot, DownloadStatus};

/// Admission tick cadence (spec.md §4.3 / SPEC_FULL.md §4.3).
pub const ADMISSION_INTERVAL: Duration = Duration::from_secs(60);

struct ManagerState {
    queues: HashMap<String, QueueConfig>,
    downloads: HashMap<String, Descriptor>,
    /// Insertion order of URLs, so admission within a queue is FIFO.
    order: Vec<String>,
    active: HashMap<String, u32>,
    /// URLs with a live `descriptor.start()` task currently running.
    ///
    /// A `paused` descriptor can mean two different things: one whose
    /// worker is still alive and blocked on its resume channel (manager-
    /// or user-initiated pause), or one whose worker already returned
    /// after a self-detected network flap (spec.md §4.2). Only the
    /// former can be woken by `descriptor.resume()` alone; the latter
    /// has nothing left listening on the channel and must be re-admitted
    /// via a fresh `start()` instead.
    live: std::collections::HashSet<String>,
}

impl ManagerState {
    fn active_count(&self, queue: &str) -> u32 {
        self.active.get(queue).copied().unwrap_or(0)
    }

    fn inc_active(&mut self, queue: &str) {
        *self.active.entry(queue.to_string()).or_insert(0) += 1;
    }

    fn dec_active(&mut self, queue: &str) {
        if let Some(count) = self.active.get_mut(queue) {
            *count = count.saturating_sub(1);
        }
    }

    fn urls_in_queue_with_status(&self, queue: &str, status: DownloadStatus) -> Vec<String> {
        self.order
            .iter()
            .filter(|url| {
                self.downloads
                    .get(*url)
                    .is_some_and(|d| d.queue() == queue && d.status() == status)
            })
            .cloned()
            .collect()
    }
}

/// Owns the set of tracked downloads and per-queue active counts, and
/// runs the periodic admission loop that promotes `pending` →
/// `downloading` subject to queue capacity and time windows (spec.md
/// §4.3). Cheap to clone; clones share the same underlying state.
#[derive(Clone)]
pub struct QueueManager {
    state: Arc<Mutex<ManagerState>>,
    db: Database,
}

impl QueueManager {
    /// Loads queues and downloads from persistence and reconstructs
    /// in-memory state. A download left `downloading` from a previous run
    /// is reset to `pending` by [`Descriptor::from_snapshot`] — no
    /// partial transfer survives a process restart (SPEC_FULL.md §3a).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if loading either table fails.
    #[instrument(skip(db))]
    pub async fn load(db: Database) -> Result<Self, QueueError> {
        let mut queues: HashMap<String, QueueConfig> = persistence::load_queues(&db)
            .await?
            .into_iter()
            .map(|q| (q.name.clone(), q))
            .collect();
        queues
            .entry("default".to_string())
            .or_insert_with(QueueConfig::default_queue);

        let snapshots = persistence::load_downloads(&db).await?;
        let mut downloads = HashMap::new();
        let mut order = Vec::new();
        let mut active: HashMap<String, u32> = HashMap::new();
        for snapshot in snapshots {
            let url = snapshot.url.clone();
            let queue = snapshot.queue.clone();
            let descriptor = Descriptor::from_snapshot(snapshot);
            if descriptor.status() == DownloadStatus::Downloading {
                *active.entry(queue).or_insert(0) += 1;
            }
            order.push(url.clone());
            downloads.insert(url, descriptor);
        }

        info!(
            queues = queues.len(),
            downloads = downloads.len(),
            "queue manager loaded"
        );

        Ok(Self {
            state: Arc::new(Mutex::new(ManagerState {
                queues,
                downloads,
                order,
                active,
                live: std::collections::HashSet::new(),
            })),
            db,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        #[allow(clippy::expect_used)]
        self.state.lock().expect("queue manager state mutex poisoned")
    }

    /// Registers (or updates) a queue's configuration and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if persisting the config fails.
    #[instrument(skip(self, cfg), fields(queue = %cfg.name))]
    pub async fn upsert_queue(&self, cfg: QueueConfig) -> Result<(), QueueError> {
        persistence::save_queue(&self.db, &cfg).await?;
        self.lock().queues.insert(cfg.name.clone(), cfg);
        Ok(())
    }

    /// Returns the configuration for a named queue, if known.
    #[must_use]
    pub fn queue_config(&self, name: &str) -> Option<QueueConfig> {
        self.lock().queues.get(name).cloned()
    }

    /// Returns the number of currently `downloading` descriptors in a
    /// queue.
    #[must_use]
    pub fn active_count(&self, queue: &str) -> u32 {
        self.lock().active_count(queue)
    }

    /// Validates and admits a new URL in `pending` status.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidUrl`] if `raw_url` doesn't parse as an
    /// absolute URI, [`QueueError::UnsupportedScheme`] for anything but
    /// `http`/`https`, and [`QueueError::DuplicateUrl`] if it is already
    /// tracked.
    #[instrument(skip(self, cfg), fields(url = %raw_url))]
    pub async fn add_url(
        &self,
        raw_url: &str,
        target_path: PathBuf,
        cfg: DescriptorConfig,
    ) -> Result<(), QueueError> {
        let parsed = Url::parse(raw_url).map_err(|_| QueueError::InvalidUrl {
            url: raw_url.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(QueueError::UnsupportedScheme {
                scheme: parsed.scheme().to_string(),
                url: raw_url.to_string(),
            });
        }

        if self.lock().downloads.contains_key(raw_url) {
            return Err(QueueError::DuplicateUrl(raw_url.to_string()));
        }

        let descriptor = Descriptor::new(raw_url, target_path, cfg);
        let snapshot = descriptor.snapshot();
        {
            let mut state = self.lock();
            state.order.push(raw_url.to_string());
            state.downloads.insert(raw_url.to_string(), descriptor);
        }
        persistence::save_download(&self.db, &snapshot).await?;
        info!("added to queue");
        self.process_all().await;
        Ok(())
    }

    /// Pauses a `downloading` descriptor, freeing its queue's active slot.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the URL isn't tracked, or
    /// [`QueueError::WrongState`] if it isn't currently `downloading`.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn pause(&self, url: &str) -> Result<(), QueueError> {
        let (descriptor, queue) = self.lookup(url)?;
        descriptor
            .pause()
            .map_err(|e| QueueError::wrong_state("pause", url, e.to_string()))?;
        self.lock().dec_active(&queue);
        self.persist(&descriptor).await?;
        info!("paused");
        Ok(())
    }

    /// Resumes a `paused` descriptor, subject to the owning queue's time
    /// window and remaining capacity.
    ///
    /// If the descriptor's worker already exited (a self-pause on a
    /// network flap; see [`ManagerState::live`](ManagerState)), this
    /// re-admits it with a fresh `start()` rather than pulsing a resume
    /// channel nobody is listening on.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the URL or its queue isn't
    /// tracked, or [`QueueError::WrongState`] if the descriptor isn't
    /// `paused`, the window is closed, or the queue is at capacity.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn resume(&self, url: &str) -> Result<(), QueueError> {
        let (descriptor, queue) = self.lookup(url)?;
        if descriptor.status() != DownloadStatus::Paused {
            return Err(QueueError::wrong_state("resume", url, "not paused"));
        }

        let allowed = {
            let state = self.lock();
            let cfg = state
                .queues
                .get(&queue)
                .ok_or_else(|| QueueError::NotFound(queue.clone()))?;
            cfg.is_time_allowed(chrono::Utc::now().time()) && state.active_count(&queue) < cfg.max_concurrent
        };
        if !allowed {
            return Err(QueueError::wrong_state(
                "resume",
                url,
                "queue closed or at capacity",
            ));
        }

        self.resume_descriptor(url.to_string(), descriptor, queue).await;
        info!("resumed");
        Ok(())
    }

    /// Wakes a `paused` descriptor: pulses its resume channel if a worker
    /// is still alive to receive it, or re-admits it with a fresh
    /// `start()` otherwise. Caller must have already verified capacity.
    async fn resume_descriptor(&self, url: String, descriptor: Descriptor, queue: String) {
        let has_live_worker = self.lock().live.contains(&url);
        if has_live_worker {
            if descriptor.resume().is_ok() {
                self.lock().inc_active(&queue);
                let _ = self.persist(&descriptor).await;
            }
        } else {
            self.admit(url, descriptor, queue).await;
        }
    }

    /// Drops a tracked download. Does not cancel an in-flight worker;
    /// callers must call `cancel()` on the descriptor first if they need
    /// I/O to stop (DESIGN.md open question, from spec.md §9/§4.3).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the URL isn't tracked, or
    /// [`QueueError::Database`] if the delete fails.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn remove(&self, url: &str) -> Result<(), QueueError> {
        let (_descriptor, queue) = self.lookup(url)?;
        {
            let mut state = self.lock();
            if state
                .downloads
                .get(url)
                .is_some_and(|d| d.status() == DownloadStatus::Downloading)
            {
                state.dec_active(&queue);
            }
            state.downloads.remove(url);
            state.order.retain(|u| u != url);
            state.live.remove(url);
        }
        persistence::delete_download(&self.db, url).await?;
        info!("removed from queue");
        Ok(())
    }

    /// Manual kick for a single `pending` descriptor, subject to the same
    /// gating as the periodic admission loop. Silently does nothing if
    /// the URL isn't tracked, isn't `pending`, or its queue is full,
    /// disabled, or closed.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn process_download(&self, url: &str) {
        let Ok((descriptor, queue)) = self.lookup(url) else {
            return;
        };
        if descriptor.status() != DownloadStatus::Pending {
            return;
        }
        let admit = {
            let state = self.lock();
            state.queues.get(&queue).is_some_and(|cfg| {
                cfg.enabled
                    && cfg.is_time_allowed(chrono::Utc::now().time())
                    && state.active_count(&queue) < cfg.max_concurrent
            })
        };
        if admit {
            self.admit(url.to_string(), descriptor, queue).await;
        }
    }

    /// Re-evaluates every queue once: pauses descriptors that fall
    /// outside their window, resumes eligible paused descriptors, and
    /// admits pending descriptors, all gated on per-queue capacity
    /// (spec.md §4.3).
    #[instrument(skip(self))]
    pub async fn process_all(&self) {
        let queue_names: Vec<String> = self.lock().queues.keys().cloned().collect();
        for queue in queue_names {
            self.process_queue(&queue).await;
        }
    }

    async fn process_queue(&self, queue: &str) {
        let Some(cfg) = self.lock().queues.get(queue).cloned() else {
            return;
        };
        if !cfg.enabled {
            debug!(queue, "disabled, skipping");
            return;
        }

        let now = chrono::Utc::now().time();
        if !cfg.is_time_allowed(now) {
            let downloading = self.lock().urls_in_queue_with_status(queue, DownloadStatus::Downloading);
            for url in downloading {
                let Some(descriptor) = self.lock().downloads.get(&url).cloned() else {
                    continue;
                };
                if descriptor.pause().is_ok() {
                    self.lock().dec_active(queue);
                    warn!(url, queue, "paused: outside allowed time window");
                    let _ = self.persist(&descriptor).await;
                }
            }
            return;
        }

        let paused = self.lock().urls_in_queue_with_status(queue, DownloadStatus::Paused);
        for url in paused {
            if self.lock().active_count(queue) >= cfg.max_concurrent {
                break;
            }
            let Some(descriptor) = self.lock().downloads.get(&url).cloned() else {
                continue;
            };
            debug!(url, queue, "eligible to resume: within allowed time window");
            self.resume_descriptor(url, descriptor, queue.to_string()).await;
        }

        let pending = self.lock().urls_in_queue_with_status(queue, DownloadStatus::Pending);
        for url in pending {
            if self.lock().active_count(queue) >= cfg.max_concurrent {
                break;
            }
            let Some(descriptor) = self.lock().downloads.get(&url).cloned() else {
                continue;
            };
            self.admit(url, descriptor, queue.to_string()).await;
        }
    }

    /// Transitions a `pending` descriptor to `downloading` and spawns its
    /// worker. On completion, reconciles the active counter (decremented
    /// exactly once, regardless of the worker's terminal status — DESIGN.md
    /// open question) and persists the final snapshot.
    async fn admit(&self, url: String, descriptor: Descriptor, queue: String) {
        {
            let mut state = self.lock();
            state.inc_active(&queue);
            state.live.insert(url.clone());
        }
        info!(url, queue, "admitted");

        let manager = self.clone();
        tokio::spawn(async move {
            let status = descriptor.start().await;
            debug!(url, ?status, "worker finished");
            let mut state = manager.lock();
            state.live.remove(&url);
            // A concurrent `remove()` already decremented this slot and
            // dropped the descriptor; don't double-decrement (DESIGN.md
            // open question: single counter-update rule).
            if state.downloads.contains_key(&url) {
                state.dec_active(&queue);
            }
            drop(state);
            let _ = manager.persist(&descriptor).await;
        });
    }

    fn lookup(&self, url: &str) -> Result<(Descriptor, String), QueueError> {
        let state = self.lock();
        let descriptor = state
            .downloads
            .get(url)
            .cloned()
            .ok_or_else(|| QueueError::NotFound(url.to_string()))?;
        let queue = descriptor.queue();
        Ok((descriptor, queue))
    }

    async fn persist(&self, descriptor: &Descriptor) -> Result<(), QueueError> {
        persistence::save_download(&self.db, &descriptor.snapshot()).await
    }

    /// Runs the periodic admission loop until cancelled. Intended to be
    /// spawned once at startup alongside the binary's other background
    /// tasks.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(ADMISSION_INTERVAL);
        loop {
            ticker.tick().await;
            self.process_all().await;
        }
    }

    /// Returns a snapshot of every tracked descriptor in insertion order,
    /// for the UI observer.
    #[must_use]
    pub fn snapshots(&self) -> Vec<DescriptorSnapshot> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|url| state.downloads.get(url).map(Descriptor::snapshot))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn manager() -> QueueManager {
        let db = Database::new_in_memory().await.unwrap();
        QueueManager::load(db).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_url_rejects_invalid_url() {
        let m = manager().await;
        let err = m.add_url("not a url", PathBuf::from("/tmp/f"), DescriptorConfig::default()).await;
        assert!(matches!(err, Err(QueueError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_add_url_rejects_unsupported_scheme() {
        let m = manager().await;
        let err = m
            .add_url("ftp://example.com/f.bin", PathBuf::from("/tmp/f"), DescriptorConfig::default())
            .await;
        assert!(matches!(err, Err(QueueError::UnsupportedScheme { .. })));
    }

    #[tokio::test]
    async fn test_add_url_rejects_duplicate() {
        let m = manager().await;
        m.add_url("https://example.com/f.bin", PathBuf::from("/tmp/f"), DescriptorConfig::default())
            .await
            .unwrap();
        let err = m
            .add_url("https://example.com/f.bin", PathBuf::from("/tmp/f2"), DescriptorConfig::default())
            .await;
        assert!(matches!(err, Err(QueueError::DuplicateUrl(_))));
    }

    #[tokio::test]
    async fn test_pause_requires_downloading() {
        let m = manager().await;
        m.add_url("https://example.com/f.bin", PathBuf::from("/tmp/f"), DescriptorConfig::default())
            .await
            .unwrap();
        let err = m.pause("https://example.com/f.bin").await;
        assert!(matches!(err, Err(QueueError::WrongState { .. })));
    }

    #[tokio::test]
    async fn test_remove_unknown_url_is_not_found() {
        let m = manager().await;
        let err = m.remove("https://example.com/missing.bin").await;
        assert!(matches!(err, Err(QueueError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_process_all_admits_pending_up_to_capacity() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", "4"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(StdDuration::from_millis(200)).set_body_bytes(b"data".to_vec()))
            .mount(&server)
            .await;

        let m = manager().await;
        m.upsert_queue(QueueConfig::new("limited", 2)).await.unwrap();

        let temp = tempfile::TempDir::new().unwrap();
        for i in 0..5 {
            let url = format!("{}/f{i}.bin", server.uri());
            let target = temp.path().join(format!("f{i}.bin"));
            m.add_url(
                &url,
                target,
                DescriptorConfig {
                    queue: Some("limited".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert!(m.active_count("limited") <= 2, "active count must respect max_concurrent");
    }

    #[tokio::test]
    async fn test_queue_outside_window_pauses_active_and_blocks_admission() {
        let m = manager().await;
        let now = chrono::Utc::now().time();
        let closed_start = now + chrono::Duration::hours(1);
        let closed_end = now + chrono::Duration::hours(2);
        m.upsert_queue(QueueConfig {
            start_time: closed_start,
            end_time: closed_end,
            ..QueueConfig::new("closed", 5)
        })
        .await
        .unwrap();

        m.add_url(
            "https://example.com/closed.bin",
            PathBuf::from("/tmp/closed.bin"),
            DescriptorConfig {
                queue: Some("closed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(m.active_count("closed"), 0, "pending descriptor must not be admitted outside the window");
    }

    /// A descriptor that self-paused after a network flap has no worker
    /// left listening on its resume channel. `resume()` must re-admit it
    /// with a fresh `start()` instead of silently flipping its status
    /// with nothing driving the transfer (regression for the `live` set).
    #[tokio::test]
    async fn test_resume_after_self_pause_respawns_worker() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", "4"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
            .mount(&server)
            .await;

        let m = manager().await;
        let temp = tempfile::TempDir::new().unwrap();
        let url = format!("{}/f.bin", server.uri());
        let target = temp.path().join("f.bin");
        m.add_url(&url, target, DescriptorConfig::default()).await.unwrap();

        // Simulate a self-pause from a prior network flap: status is
        // Paused but there is no live worker task for this URL.
        {
            let (descriptor, _queue) = m.lookup(&url).unwrap();
            descriptor.set_status_for_test(DownloadStatus::Paused);
        }
        assert!(!m.lock().live.contains(&url));

        m.resume(&url).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(100)).await;

        let status = m.lookup(&url).unwrap().0.status();
        assert!(
            matches!(status, DownloadStatus::Completed | DownloadStatus::Downloading),
            "expected the respawned worker to make progress, got {status:?}"
        );
    }
}
