//! The download descriptor: per-transfer state machine and I/O pipeline.
//!
//! A [`Descriptor`] is the unit of work the [`QueueManager`](crate::queue::QueueManager)
//! admits and a worker drives to completion. It owns the mutable progress
//! fields behind a plain mutex (no `.await` is ever held across the lock)
//! and three single-slot control channels that `pause`/`resume`/`cancel`
//! use to signal the in-flight transfer loop cooperatively, mirroring
//! `original_source/internal/downloader/download.go`'s `pauseChan` /
//! `resumeChan` / `cancelChan` trio.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::client::HttpClient;
use super::constants::{
    DEFAULT_QUEUE_NAME, GET_RETRY_ATTEMPTS, GET_RETRY_BACKOFF_UNIT, MAX_QUEUE_NAME_LEN,
    PARTIAL_COMPLETION_THRESHOLD, TRANSFER_BUFFER_SIZE,
};
use super::error::{DownloadError, InvalidTransition};
use super::filename::{filename_from_target_path, normalize_queue_name};
use super::rate_limiter::{RateLimiter, ThrottledReader};
use super::retry::{RetryDecision, RetryPolicy};

/// Lifecycle status of a download descriptor (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl DownloadStatus {
    /// `completed`/`cancelled` are terminal: no transition leaves them.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Default `max_retries` for a descriptor that doesn't specify one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default `retry_delay` for a descriptor that doesn't specify one.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Mutable progress/status state, guarded by [`Descriptor`]'s mutex.
#[derive(Debug, Clone)]
struct DescriptorState {
    target_path: PathBuf,
    filename: String,
    queue: String,
    max_bandwidth_kbps: u64,
    max_retries: u32,
    retry_delay: Duration,
    scheduled_start_time: Option<DateTime<Utc>>,
    downloaded: u64,
    total_size: u64,
    progress: f64,
    speed: u64,
    status: DownloadStatus,
    error_message: Option<String>,
    retry_count: u32,
    start_time: Option<DateTime<Utc>>,
    completion_time: Option<DateTime<Utc>>,
    supports_ranges: bool,
}

/// A point-in-time, serializable copy of a descriptor's observable state,
/// suitable for the UI observer and for persistence (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorSnapshot {
    pub url: String,
    pub target_path: PathBuf,
    pub filename: String,
    pub queue: String,
    pub max_bandwidth_kbps: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub downloaded: u64,
    pub total_size: u64,
    pub progress: f64,
    pub speed: u64,
    pub status: DownloadStatus,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub supports_ranges: bool,
}

/// The three single-slot control channels a descriptor exposes to its
/// worker. Senders are cloned out and used with non-blocking `try_send`
/// so repeated signals coalesce instead of queueing (spec.md §9).
struct Channels {
    pause_tx: Mutex<mpsc::Sender<()>>,
    resume_tx: Mutex<mpsc::Sender<()>>,
    cancel_tx: Mutex<mpsc::Sender<()>>,
}

struct ActiveReceivers {
    pause_rx: mpsc::Receiver<()>,
    resume_rx: mpsc::Receiver<()>,
    cancel_rx: mpsc::Receiver<()>,
}

impl Channels {
    fn new() -> (Self, ActiveReceivers) {
        let (pause_tx, pause_rx) = mpsc::channel(1);
        let (resume_tx, resume_rx) = mpsc::channel(1);
        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        (
            Self {
                pause_tx: Mutex::new(pause_tx),
                resume_tx: Mutex::new(resume_tx),
                cancel_tx: Mutex::new(cancel_tx),
            },
            ActiveReceivers {
                pause_rx,
                resume_rx,
                cancel_rx,
            },
        )
    }

    /// Replaces all three senders with a fresh set, returning their
    /// matching receivers for the worker that is about to start.
    fn reset(&self) -> ActiveReceivers {
        let (pause_tx, pause_rx) = mpsc::channel(1);
        let (resume_tx, resume_rx) = mpsc::channel(1);
        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        *lock(&self.pause_tx) = pause_tx;
        *lock(&self.resume_tx) = resume_tx;
        *lock(&self.cancel_tx) = cancel_tx;
        ActiveReceivers {
            pause_rx,
            resume_rx,
            cancel_rx,
        }
    }

    fn pulse_pause(&self) {
        let _ = lock(&self.pause_tx).try_send(());
    }

    fn pulse_resume(&self) {
        let _ = lock(&self.resume_tx).try_send(());
    }

    fn pulse_cancel(&self) {
        let _ = lock(&self.cancel_tx).try_send(());
    }
}

#[allow(clippy::expect_used)]
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().expect("descriptor channel mutex poisoned")
}

struct Inner {
    url: String,
    state: Mutex<DescriptorState>,
    channels: Channels,
    http_client: HttpClient,
}

/// A single download's descriptor: identity, destination, limits,
/// schedule, progress and status (spec.md §3). Cheap to clone; all clones
/// share the same underlying state and control channels.
#[derive(Clone)]
pub struct Descriptor {
    inner: Arc<Inner>,
}

/// Parameters accepted when constructing a new descriptor, mirroring the
/// fields a caller (UI or config loader) supplies up front.
#[derive(Debug, Clone, Default)]
pub struct DescriptorConfig {
    pub queue: Option<String>,
    pub max_bandwidth_kbps: u64,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub scheduled_start_time: Option<DateTime<Utc>>,
}

impl Descriptor {
    /// Creates a new `pending` descriptor for `url`, writing to
    /// `target_path`. Unset limits take the spec defaults; a missing or
    /// malformed `queue` becomes `"default"` (spec.md §3).
    #[must_use]
    pub fn new(url: impl Into<String>, target_path: impl Into<PathBuf>, cfg: DescriptorConfig) -> Self {
        let target_path = target_path.into();
        let filename = filename_from_target_path(&target_path);
        let queue = cfg
            .queue
            .as_deref()
            .and_then(|q| normalize_queue_name(q, MAX_QUEUE_NAME_LEN))
            .unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string());

        let (channels, _receivers) = Channels::new();

        let state = DescriptorState {
            target_path,
            filename,
            queue,
            max_bandwidth_kbps: cfg.max_bandwidth_kbps,
            max_retries: cfg.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: cfg.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            scheduled_start_time: cfg.scheduled_start_time,
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

        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                state: Mutex::new(state),
                channels,
                http_client: HttpClient::new(),
            }),
        }
    }

    /// Reconstructs a descriptor from a persisted snapshot. Any status
    /// that was `downloading` when saved is reset to `pending`: no
    /// partial transfer survives a process restart (SPEC_FULL.md §3a).
    #[must_use]
    pub fn from_snapshot(mut snapshot: DescriptorSnapshot) -> Self {
        if snapshot.status == DownloadStatus::Downloading {
            snapshot.status = DownloadStatus::Pending;
        }
        let (channels, _receivers) = Channels::new();
        let state = DescriptorState {
            target_path: snapshot.target_path,
            filename: snapshot.filename,
            queue: snapshot.queue,
            max_bandwidth_kbps: snapshot.max_bandwidth_kbps,
            max_retries: snapshot.max_retries,
            retry_delay: Duration::from_secs(snapshot.retry_delay_secs),
            scheduled_start_time: snapshot.scheduled_start_time,
            downloaded: snapshot.downloaded,
            total_size: snapshot.total_size,
            progress: snapshot.progress,
            speed: 0,
            status: snapshot.status,
            error_message: snapshot.error_message,
            retry_count: snapshot.retry_count,
            start_time: snapshot.start_time,
            completion_time: snapshot.completion_time,
            supports_ranges: snapshot.supports_ranges,
        };
        Self {
            inner: Arc::new(Inner {
                url: snapshot.url,
                state: Mutex::new(state),
                channels,
                http_client: HttpClient::new(),
            }),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DescriptorState> {
        #[allow(clippy::expect_used)]
        self.inner.state.lock().expect("descriptor state mutex poisoned")
    }

    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        self.lock_state().status
    }

    #[must_use]
    pub fn queue(&self) -> String {
        self.lock_state().queue.clone()
    }

    #[must_use]
    pub fn downloaded(&self) -> u64 {
        self.lock_state().downloaded
    }

    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.lock_state().total_size
    }

    #[must_use]
    pub fn progress(&self) -> f64 {
        self.lock_state().progress
    }

    #[must_use]
    pub fn speed(&self) -> u64 {
        self.lock_state().speed
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.lock_state().retry_count
    }

    /// A coherent snapshot of every observable field, for the UI observer
    /// or for persistence.
    #[must_use]
    pub fn snapshot(&self) -> DescriptorSnapshot {
        let s = self.lock_state();
        DescriptorSnapshot {
            url: self.inner.url.clone(),
            target_path: s.target_path.clone(),
            filename: s.filename.clone(),
            queue: s.queue.clone(),
            max_bandwidth_kbps: s.max_bandwidth_kbps,
            max_retries: s.max_retries,
            retry_delay_secs: s.retry_delay.as_secs(),
            scheduled_start_time: s.scheduled_start_time,
            downloaded: s.downloaded,
            total_size: s.total_size,
            progress: s.progress,
            speed: s.speed,
            status: s.status,
            error_message: s.error_message.clone(),
            retry_count: s.retry_count,
            start_time: s.start_time,
            completion_time: s.completion_time,
            supports_ranges: s.supports_ranges,
        }
    }

    /// Permitted only from `downloading`; sets `paused` and pulses the
    /// pause channel. Rejecting from any other status is itself a no-op:
    /// state does not change (spec.md §4.2).
    #[instrument(skip(self), fields(url = %self.inner.url))]
    pub fn pause(&self) -> Result<(), InvalidTransition> {
        let mut s = self.lock_state();
        if s.status != DownloadStatus::Downloading {
            warn!(status = ?s.status, "pause rejected");
            return Err(InvalidTransition {
                operation: "pause",
                status: s.status,
            });
        }
        s.status = DownloadStatus::Paused;
        drop(s);
        self.inner.channels.pulse_pause();
        info!("paused");
        Ok(())
    }

    /// Permitted only from `paused`; sets `downloading` and pulses the
    /// resume channel.
    #[instrument(skip(self), fields(url = %self.inner.url))]
    pub fn resume(&self) -> Result<(), InvalidTransition> {
        let mut s = self.lock_state();
        if s.status != DownloadStatus::Paused {
            warn!(status = ?s.status, "resume rejected");
            return Err(InvalidTransition {
                operation: "resume",
                status: s.status,
            });
        }
        s.status = DownloadStatus::Downloading;
        drop(s);
        self.inner.channels.pulse_resume();
        info!("resumed");
        Ok(())
    }

    /// Permitted from any non-terminal state; idempotent (a second call
    /// is a no-op). Deletes the partial target file if any bytes were
    /// already written.
    #[instrument(skip(self), fields(url = %self.inner.url))]
    pub fn cancel(&self) -> Result<(), DownloadError> {
        let mut s = self.lock_state();
        if s.status.is_terminal() {
            return Ok(());
        }
        s.status = DownloadStatus::Cancelled;
        let downloaded = s.downloaded;
        let path = s.target_path.clone();
        drop(s);
        self.inner.channels.pulse_cancel();
        info!("cancelled");

        if downloaded > 0 {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(DownloadError::io(path, e)),
            }
        }
        Ok(())
    }

    /// Permitted only from `error`: clears error fields, sets `pending`,
    /// increments `retry_count`. The caller must call `start()` again to
    /// actually resume the transfer.
    #[instrument(skip(self), fields(url = %self.inner.url))]
    pub fn retry(&self) -> Result<(), InvalidTransition> {
        let mut s = self.lock_state();
        if s.status != DownloadStatus::Error {
            return Err(InvalidTransition {
                operation: "retry",
                status: s.status,
            });
        }
        s.status = DownloadStatus::Pending;
        s.error_message = None;
        s.retry_count += 1;
        info!(retry_count = s.retry_count, "retry requested");
        Ok(())
    }

    /// Resets the retry counter, independent of a successful completion.
    pub fn reset_retry_count(&self) {
        self.lock_state().retry_count = 0;
    }

    /// Test-only escape hatch to force a status transition without going
    /// through `pause`/`resume`/`cancel`, for simulating a worker that has
    /// already exited (e.g. a self-pause on a network flap) without
    /// actually driving a transfer.
    #[cfg(test)]
    pub(crate) fn set_status_for_test(&self, status: DownloadStatus) {
        self.lock_state().status = status;
    }

    /// Idempotent setup: fills default retries/delay/filename, all of
    /// which `new`/`from_snapshot` already populate. Safe to call any
    /// number of times; exposed so callers (and tests) can assert
    /// derived fields before driving a transfer.
    pub fn initialize(&self) {
        let mut s = self.lock_state();
        if s.max_retries == 0 {
            s.max_retries = DEFAULT_MAX_RETRIES;
        }
        if s.retry_delay.is_zero() {
            s.retry_delay = DEFAULT_RETRY_DELAY;
        }
        if s.filename.is_empty() {
            s.filename = filename_from_target_path(&s.target_path);
        }
    }

    /// Blocks until the descriptor reaches a terminal-for-this-call
    /// status (`completed`, `error`, `cancelled`, or a self-induced
    /// `paused` on a network flap) and returns that status, orchestrating
    /// retries internally per spec.md §4.2's retry policy.
    #[instrument(skip(self), fields(url = %self.inner.url))]
    pub async fn start(&self) -> DownloadStatus {
        self.initialize();
        let mut receivers = self.inner.channels.reset();

        {
            let mut s = self.lock_state();
            s.status = DownloadStatus::Downloading;
            s.start_time = Some(Utc::now());
        }

        let scheduled_start_time = self.lock_state().scheduled_start_time;
        if let Some(scheduled) = scheduled_start_time {
            let now = Utc::now();
            if scheduled > now {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let wait = (scheduled - now).num_milliseconds().max(0) as u64;
                debug!(wait_ms = wait, "waiting for scheduled start time");
                tokio::time::sleep(Duration::from_millis(wait)).await;
            }
        }

        let max_retries = self.lock_state().max_retries;
        let retry_delay = self.lock_state().retry_delay;
        let policy = RetryPolicy::new(max_retries + 1, retry_delay);
        let mut attempt_number = 1;

        loop {
            match self.attempt(&mut receivers).await {
                Ok(AttemptOutcome::Completed) => {
                    let mut s = self.lock_state();
                    s.status = DownloadStatus::Completed;
                    if s.total_size == 0 {
                        s.total_size = s.downloaded;
                    }
                    s.progress = 100.0;
                    s.completion_time = Some(Utc::now());
                    info!(downloaded = s.downloaded, "completed");
                    return DownloadStatus::Completed;
                }
                Ok(AttemptOutcome::PausedOnNetworkFlap) => {
                    self.lock_state().status = DownloadStatus::Paused;
                    warn!("paused after network flap");
                    return DownloadStatus::Paused;
                }
                Ok(AttemptOutcome::Cancelled) => {
                    // status was already set to Cancelled by cancel().
                    return DownloadStatus::Cancelled;
                }
                Err(error) => {
                    let mut s = self.lock_state();
                    if s.status == DownloadStatus::Cancelled {
                        return DownloadStatus::Cancelled;
                    }
                    match policy.should_retry(&error, attempt_number) {
                        RetryDecision::Retry { delay, attempt } => {
                            s.retry_count += 1;
                            s.status = DownloadStatus::Pending;
                            warn!(%error, next_attempt = attempt, "retrying after delay");
                            drop(s);
                            tokio::time::sleep(delay).await;
                            self.lock_state().status = DownloadStatus::Downloading;
                            attempt_number = attempt;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            s.status = DownloadStatus::Error;
                            s.error_message = Some(format!(
                                "{error} (after {attempt_number} attempt(s): {reason})"
                            ));
                            warn!(%error, reason, "giving up");
                            return DownloadStatus::Error;
                        }
                    }
                }
            }
        }
    }

    /// Sends the GET, retrying transport-level failures (not HTTP status
    /// errors) up to [`GET_RETRY_ATTEMPTS`] times with linear backoff, per
    /// spec.md §4.2 step 3.
    async fn get_with_transport_retry(
        &self,
        url: &str,
        resume_from: Option<u64>,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.inner.http_client.get(url, resume_from).await {
                Ok(r) => return Ok(r),
                Err(e @ DownloadError::HttpStatus { .. }) => return Err(e),
                Err(e) if attempt < GET_RETRY_ATTEMPTS => {
                    warn!(%e, attempt, "GET transport error, retrying");
                    tokio::time::sleep(GET_RETRY_BACKOFF_UNIT * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, receivers: &mut ActiveReceivers) -> Result<AttemptOutcome, DownloadError> {
        let url = self.inner.url.clone();

        let probe = self.inner.http_client.probe(&url).await.ok();
        let (mut total_size, server_supports_ranges) = probe
            .map(|p| (p.total_size.unwrap_or(0), p.supports_ranges))
            .unwrap_or((0, false));

        let downloaded_so_far = self.lock_state().downloaded;
        let resume_from = (downloaded_so_far > 0 && server_supports_ranges).then_some(downloaded_so_far);

        let response = match self.get_with_transport_retry(&url, resume_from).await {
            Ok(r) => r,
            Err(e) if is_recoverable_flap(&e) => return Ok(AttemptOutcome::PausedOnNetworkFlap),
            Err(e) => return Err(e),
        };

        let confirmed_ranges = server_supports_ranges || response.status().as_u16() == 206;
        if total_size == 0 {
            total_size = response.content_length().unwrap_or(0);
        }

        {
            let mut s = self.lock_state();
            s.total_size = total_size;
            s.supports_ranges = confirmed_ranges;
        }

        let resuming = resume_from.is_some();
        let start_offset = if resuming { downloaded_so_far } else { 0 };
        if !resuming {
            self.lock_state().downloaded = 0;
        }

        let target_path = self.lock_state().target_path.clone();
        if let Some(parent) = target_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DownloadError::io(parent, e))?;
            }
        }

        let mut file = open_target(&target_path, resuming)
            .await
            .map_err(|e| DownloadError::io(&target_path, e))?;

        let limiter = {
            let kbps = self.lock_state().max_bandwidth_kbps;
            (kbps > 0).then(|| RateLimiter::new(kbps * 1024))
        };

        let result = self
            .transfer(response, &mut file, start_offset, total_size, limiter.as_ref(), receivers)
            .await;

        if let Some(l) = &limiter {
            l.stop();
        }

        result
    }

    #[allow(clippy::too_many_lines)]
    async fn transfer(
        &self,
        response: reqwest::Response,
        file: &mut tokio::fs::File,
        start_offset: u64,
        total_size: u64,
        limiter: Option<&RateLimiter>,
        receivers: &mut ActiveReceivers,
    ) -> Result<AttemptOutcome, DownloadError> {
        use tokio::io::AsyncWriteExt;

        let stream = response
            .bytes_stream()
            .map(|r| r.map_err(std::io::Error::other));
        let stream_reader = tokio_util::io::StreamReader::new(stream);
        let mut reader = ThrottledReader::new(stream_reader, limiter.cloned());

        let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE];
        let mut downloaded = start_offset;
        let mut window_start = Instant::now();
        let mut window_bytes = 0u64;
        let mut last_checkpoint = Instant::now();
        let mut last_checkpoint_tenths = (downloaded as f64 / total_size.max(1) as f64 * 10.0) as u64;

        loop {
            if receivers.cancel_rx.try_recv().is_ok() {
                return Ok(AttemptOutcome::Cancelled);
            }
            if receivers.pause_rx.try_recv().is_ok() {
                info!(downloaded, "paused mid-transfer, waiting for resume or cancel");
                tokio::select! {
                    _ = receivers.resume_rx.recv() => {
                        window_start = Instant::now();
                        window_bytes = 0;
                    }
                    _ = receivers.cancel_rx.recv() => {
                        return Ok(AttemptOutcome::Cancelled);
                    }
                }
            }

            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| DownloadError::network_io(&self.inner.url, e))?;
            if n == 0 {
                break;
            }

            file.write_all(&buf[..n])
                .await
                .map_err(|e| DownloadError::io(self.lock_state().target_path.clone(), e))?;

            downloaded += n as u64;
            window_bytes += n as u64;

            {
                let mut s = self.lock_state();
                s.downloaded = downloaded;
                if total_size > 0 {
                    s.progress = (downloaded as f64 / total_size as f64) * 100.0;
                }
            }

            let elapsed = window_start.elapsed();
            if elapsed >= Duration::from_secs(1) {
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let bps = (window_bytes as f64 / elapsed.as_secs_f64()) as u64;
                self.lock_state().speed = bps;
                window_start = Instant::now();
                window_bytes = 0;

                let tenths = if total_size > 0 {
                    ((downloaded as f64 / total_size as f64) * 10.0) as u64
                } else {
                    0
                };
                if tenths > last_checkpoint_tenths || last_checkpoint.elapsed() >= Duration::from_secs(30) {
                    info!(downloaded, total_size, "progress checkpoint");
                    last_checkpoint_tenths = tenths;
                    last_checkpoint = Instant::now();
                }
            }
        }

        file.flush().await.map_err(|e| DownloadError::io(self.lock_state().target_path.clone(), e))?;

        if downloaded >= total_size || total_size == 0 {
            return Ok(AttemptOutcome::Completed);
        }

        #[allow(clippy::cast_precision_loss)]
        let fraction = downloaded as f64 / total_size as f64;
        let supports_ranges = self.lock_state().supports_ranges;
        if fraction > PARTIAL_COMPLETION_THRESHOLD && supports_ranges {
            self.lock_state().downloaded = downloaded;
            return Ok(AttemptOutcome::Completed);
        }

        Err(DownloadError::network_io(
            &self.inner.url,
            std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("incomplete transfer: got {downloaded} of {total_size} bytes"),
            ),
        ))
    }
}

/// Timeouts and response-body EOF are treated as recoverable network
/// flaps (self-pause, no retry budget spent); connection/DNS failures
/// are surfaced as retriable errors instead (spec.md §4.2 step 3).
fn is_recoverable_flap(error: &DownloadError) -> bool {
    matches!(error, DownloadError::Timeout { .. })
        || matches!(error, DownloadError::Network { source, .. } if source.is_body())
}

async fn open_target(path: &Path, resuming: bool) -> std::io::Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    if resuming {
        options.write(true).append(true).create(true);
    } else {
        options.write(true).create(true).truncate(true);
    }
    options.open(path).await
}

/// Outcome of a single HTTP negotiation + transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Completed,
    PausedOnNetworkFlap,
    Cancelled,
}
