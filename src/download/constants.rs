//! Constants for the download module (timeouts, negotiation limits).

use std::time::Duration;

/// Overall request timeout, covering the whole HEAD/GET round trip.
pub const TOTAL_TIMEOUT_SECS: u64 = 60;

/// TLS handshake timeout.
pub const TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 30;

/// Time allowed to receive response headers once a request is sent.
pub const RESPONSE_HEADER_TIMEOUT_SECS: u64 = 30;

/// Time allowed for a server to respond to an `Expect: 100-continue`.
pub const EXPECT_CONTINUE_TIMEOUT_SECS: u64 = 5;

/// How long an idle pooled connection is kept before being closed.
pub const IDLE_CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Maximum number of idle connections kept per host.
pub const MAX_IDLE_CONNECTIONS: usize = 10;

/// Timeout for the plain TCP connectivity probe used by `NetworkMonitor`.
pub const TCP_PROBE_TIMEOUT_SECS: u64 = 5;

/// Number of attempts for the initial GET before giving up on the request
/// itself (not the streaming transfer), with linear backoff between them.
pub const GET_RETRY_ATTEMPTS: u32 = 3;

/// Base unit of the linear backoff between GET attempts (1s, 2s, ...).
pub const GET_RETRY_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Size of the buffer used to read the response body one chunk at a time.
pub const TRANSFER_BUFFER_SIZE: usize = 32 * 1024;

/// Fraction of `total_size` above which a short read against a
/// range-capable server is treated as a non-fatal partial completion
/// rather than a retriable failure.
pub const PARTIAL_COMPLETION_THRESHOLD: f64 = 0.95;

/// Maximum length of a queue name before it is considered malformed.
pub const MAX_QUEUE_NAME_LEN: usize = 50;

/// Queue name substituted when a descriptor's `queue` field is empty or
/// malformed.
pub const DEFAULT_QUEUE_NAME: &str = "default";
