//! `NetworkMonitor`: periodic connectivity probe.
//!
//! Grounded in `original_source/internal/network/monitor.go`'s `Monitor`:
//! a background task resolves a configured host, then opens a plain TCP
//! connection to port 80, on a fixed tick. The result is published as a
//! shared boolean the [`QueueManager`](crate::queue::QueueManager) may
//! consult, but admission is never otherwise gated on it (spec.md §4.4).
//! Status-change logging is edge-triggered: only a transition between
//! connected/disconnected is logged, not every tick, mirroring the
//! original's `updateStatus`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::{TcpStream, lookup_host};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Default host resolved/dialed by a monitor constructed with
/// [`NetworkMonitor::new_default`].
pub const DEFAULT_CHECK_HOST: &str = "google.com";

/// Default cadence between connectivity probes.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for the DNS resolution and TCP connect steps of a single probe
/// (spec.md §5: "TCP connectivity probe 5s").
const PROBE_TIMEOUT_SECS: u64 = 5;

struct Inner {
    check_interval: Duration,
    check_host: String,
    connected: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Background connectivity probe. Cheap to clone; clones share the same
/// underlying status flag and background task.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<Inner>,
}

impl NetworkMonitor {
    /// Creates a monitor that probes `check_host` on port 80 every
    /// `check_interval`. Assumes connected until the first probe
    /// completes, matching the original's optimistic default.
    #[must_use]
    pub fn new(check_interval: Duration, check_host: impl Into<String>) -> Self {
        let check_host = check_host.into();
        info!(?check_interval, check_host = %check_host, "initializing network monitor");
        Self {
            inner: Arc::new(Inner {
                check_interval,
                check_host,
                connected: AtomicBool::new(true),
                task: Mutex::new(None),
            }),
        }
    }

    /// Creates a monitor with [`DEFAULT_CHECK_INTERVAL`] and
    /// [`DEFAULT_CHECK_HOST`].
    #[must_use]
    pub fn new_default() -> Self {
        Self::new(DEFAULT_CHECK_INTERVAL, DEFAULT_CHECK_HOST)
    }

    /// Returns the most recently observed connectivity status.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Starts the background probe loop. Calling `start` more than once
    /// replaces any previously running task.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!("starting network monitor");
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { run(inner).await });
        *self.inner.task.lock().await = Some(handle);
    }

    /// Stops the background probe loop.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        info!("stopping network monitor");
        if let Some(handle) = self.inner.task.lock().await.take() {
            handle.abort();
        }
    }
}

async fn run(inner: Arc<Inner>) {
    debug!("network monitor started running");
    let mut ticker = tokio::time::interval(inner.check_interval);
    loop {
        ticker.tick().await;
        check_connection(&inner).await;
    }
}

async fn check_connection(inner: &Inner) {
    let timeout = Duration::from_secs(PROBE_TIMEOUT_SECS);

    debug!(host = %inner.check_host, "checking DNS resolution");
    let resolved = tokio::time::timeout(timeout, lookup_host((inner.check_host.as_str(), 80))).await;
    let mut addrs = match resolved {
        Ok(Ok(addrs)) => addrs,
        Ok(Err(e)) => {
            update_status(inner, false, &format!("DNS resolution failed: {e}"));
            return;
        }
        Err(_) => {
            update_status(inner, false, "DNS resolution timed out");
            return;
        }
    };

    let Some(addr) = addrs.next() else {
        update_status(inner, false, "DNS resolution returned no addresses");
        return;
    };

    debug!(%addr, "attempting TCP connection");
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => update_status(inner, true, "network connection is active"),
        Ok(Err(e)) => update_status(inner, false, &format!("TCP connection failed: {e}")),
        Err(_) => update_status(inner, false, "TCP connection timed out"),
    }
}

fn update_status(inner: &Inner, connected: bool, message: &str) {
    let previous = inner.connected.swap(connected, Ordering::AcqRel);
    if previous != connected {
        if connected {
            info!(message, "network connection restored");
        } else {
            warn!(message, "network connection lost");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_new_defaults_to_connected() {
        let monitor = NetworkMonitor::new(Duration::from_secs(60), "localhost");
        assert!(monitor.is_connected());
    }

    #[tokio::test]
    async fn test_check_connection_succeeds_against_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    return;
                }
            }
        });

        let inner = Inner {
            check_interval: Duration::from_secs(60),
            check_host: "127.0.0.1".to_string(),
            connected: AtomicBool::new(false),
            task: Mutex::new(None),
        };
        // Bypass the fixed port-80 probe to exercise the connect path
        // directly against our ephemeral listener.
        let timeout = Duration::from_secs(PROBE_TIMEOUT_SECS);
        let addr = format!("127.0.0.1:{port}");
        let result = tokio::time::timeout(timeout, TcpStream::connect(&addr)).await;
        assert!(result.is_ok() && result.unwrap().is_ok());
        update_status(&inner, true, "ok");
        assert!(inner.connected.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_update_status_only_flips_on_change() {
        let inner = Inner {
            check_interval: Duration::from_secs(60),
            check_host: "localhost".to_string(),
            connected: AtomicBool::new(true),
            task: Mutex::new(None),
        };
        update_status(&inner, true, "still up");
        assert!(inner.connected.load(Ordering::Acquire));
        update_status(&inner, false, "now down");
        assert!(!inner.connected.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_start_then_stop_does_not_panic() {
        let monitor = NetworkMonitor::new(Duration::from_millis(50), "localhost");
        monitor.start().await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        monitor.stop().await;
    }
}
