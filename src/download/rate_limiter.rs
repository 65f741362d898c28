//! Per-download bandwidth shaping via a token-bucket rate limiter.
//!
//! Each [`Descriptor`](crate::download::Descriptor) that has a
//! `max_bandwidth_kbps` configured owns one [`RateLimiter`]. The limiter
//! hands out one token per byte the worker is about to read, refilling
//! the bucket on a fixed tick. This mirrors the credit-channel design of
//! the original downloader's rate limiter: a background task deposits
//! tokens into a bounded channel on a timer, and `acquire` drains one
//! token per byte, blocking when the bucket is empty.
//!
//! # Example
//!
//! ```no_run
//! use fetchqueue_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(64 * 1024); // 64 KiB/s
//! limiter.acquire(8192).await; // charge for an 8 KiB chunk
//! limiter.stop();
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

/// Tokens are refilled on this cadence; each tick deposits
/// `bytes_per_second / REFILLS_PER_SECOND` credits.
const REFILL_INTERVAL: Duration = Duration::from_millis(100);
const REFILLS_PER_SECOND: u64 = 10;

/// Upper bound on the number of buffered byte-credits, so a long idle
/// period does not let the bucket grow without bound (the bucket size
/// itself is `bytes_per_second`, per spec; the channel capacity just
/// needs to be large enough never to block the refill task).
const CREDIT_CHANNEL_CAPACITY: usize = 1_000;

/// A per-download token bucket limiting sustained throughput to a
/// configured number of bytes per second.
///
/// Cloning a `RateLimiter` clones the handle; all clones share the same
/// underlying bucket and refill task.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    bytes_per_second: u64,
    tokens_tx: mpsc::Sender<()>,
    tokens_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    stopped: AtomicBool,
    refill_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Creates a rate limiter capped at `bytes_per_second` and starts its
    /// background refill task.
    #[must_use]
    #[instrument]
    pub fn new(bytes_per_second: u64) -> Self {
        let (tokens_tx, tokens_rx) = mpsc::channel(CREDIT_CHANNEL_CAPACITY);
        let inner = Arc::new(Inner {
            bytes_per_second,
            tokens_tx,
            tokens_rx: tokio::sync::Mutex::new(tokens_rx),
            stopped: AtomicBool::new(false),
            refill_task: tokio::sync::Mutex::new(None),
        });

        let handle = tokio::spawn(Self::refill_loop(
            Arc::clone(&inner),
            inner.tokens_tx.clone(),
        ));
        // `try_lock` is safe here: nothing else can have a handle to this
        // brand-new Arc's mutex yet.
        if let Ok(mut slot) = inner.refill_task.try_lock() {
            *slot = Some(handle);
        }

        debug!(bytes_per_second, "created rate limiter");
        Self { inner }
    }

    /// How many bytes per second this limiter allows.
    #[must_use]
    pub fn bytes_per_second(&self) -> u64 {
        self.inner.bytes_per_second
    }

    /// Acquires `n` byte-credits, waiting for the bucket to refill if it
    /// is currently empty. Charges one channel receive per byte, exactly
    /// as the original rate limiter's `GetToken` does.
    #[instrument(skip(self))]
    pub async fn acquire(&self, n: usize) {
        if self.inner.stopped.load(Ordering::Acquire) {
            return;
        }
        let mut rx = self.inner.tokens_rx.lock().await;
        for _ in 0..n {
            if rx.recv().await.is_none() {
                // Refill task stopped; stop blocking further reads.
                break;
            }
        }
    }

    /// Stops the background refill task. Any in-flight `acquire` calls
    /// unblock once the channel is drained and closed.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        if let Ok(mut slot) = self.inner.refill_task.try_lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        debug!("rate limiter stopped");
    }

    async fn refill_loop(inner: Arc<Inner>, tokens_tx: mpsc::Sender<()>) {
        let per_tick = (inner.bytes_per_second / REFILLS_PER_SECOND).max(1);
        let mut ticker = tokio::time::interval(REFILL_INTERVAL);
        loop {
            ticker.tick().await;
            if inner.stopped.load(Ordering::Acquire) {
                return;
            }
            for _ in 0..per_tick {
                if tokens_tx.try_send(()).is_err() {
                    // Bucket is full; drop the excess credit rather than
                    // block the refill tick.
                    break;
                }
            }
        }
    }
}

/// A reader wrapper that charges an optional rate limiter for every byte
/// read before returning it to the caller, mirroring the original
/// `Read(reader, buffer)` helper. With no limiter configured, reads pass
/// through unthrottled.
pub struct ThrottledReader<R> {
    inner: R,
    limiter: Option<RateLimiter>,
}

impl<R> ThrottledReader<R> {
    pub fn new(inner: R, limiter: Option<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

impl<R: tokio::io::AsyncRead + Unpin> ThrottledReader<R> {
    /// Reads into `buf`, charging the limiter (if any) for the number of
    /// bytes actually read before returning.
    pub async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        use tokio::io::AsyncReadExt;
        let n = self.inner.read(buf).await?;
        if n > 0 {
            if let Some(limiter) = &self.limiter {
                limiter.acquire(n).await;
            }
        }
        Ok(n)
    }
}
