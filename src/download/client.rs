//! HTTP client wrapper used for HEAD/GET negotiation.
//!
//! `HttpClient` owns a single pooled `reqwest::Client` and exposes the
//! small surface the download worker needs: a HEAD probe for
//! `Accept-Ranges`/`Content-Length`, and a GET that can optionally carry a
//! `Range` header for resume. The worker itself (see
//! [`crate::download::Descriptor`]) drives the streaming transfer loop,
//! since it needs to interleave reads with rate limiting and
//! pause/cancel polling.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, ACCEPT_RANGES, CONTENT_LENGTH, RANGE, USER_AGENT};
use tracing::{debug, instrument};

use super::constants::{
    EXPECT_CONTINUE_TIMEOUT_SECS, IDLE_CONNECTION_TIMEOUT_SECS, MAX_IDLE_CONNECTIONS,
    RESPONSE_HEADER_TIMEOUT_SECS, TLS_HANDSHAKE_TIMEOUT_SECS, TOTAL_TIMEOUT_SECS,
};
use super::error::DownloadError;
use crate::user_agent::{DOWNLOAD_ACCEPT, DOWNLOAD_ACCEPT_LANGUAGE, DOWNLOAD_USER_AGENT};

/// HTTP client for HEAD/GET negotiation with pooled connections.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client using the timeout figures from the
    /// concurrency and resource model: 60s total, 30s TLS handshake, 30s
    /// response header, 5s expect-continue, 30s idle-connection, 10 max
    /// idle connections per host.
    ///
    /// # Panics
    ///
    /// Panics if the client builder fails with this static configuration.
    /// This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(TLS_HANDSHAKE_TIMEOUT_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(RESPONSE_HEADER_TIMEOUT_SECS))
            .pool_idle_timeout(Duration::from_secs(IDLE_CONNECTION_TIMEOUT_SECS))
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS)
            .tcp_keepalive(Duration::from_secs(EXPECT_CONTINUE_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Sends a HEAD request and reports whether the server advertises
    /// range support and, if known, the resource's total size.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn probe(&self, url: &str) -> Result<ProbeResult, DownloadError> {
        let response = self.client.head(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let supports_ranges = response
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));
        let total_size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        debug!(supports_ranges, ?total_size, "probed resource");
        Ok(ProbeResult {
            supports_ranges,
            total_size,
            status: response.status().as_u16(),
        })
    }

    /// Sends a GET request, optionally resuming from `resume_from` bytes
    /// via a `Range` header. Carries the stable desktop User-Agent and
    /// `Accept`/`Accept-Language` pair (spec.md §4.2 step 2) on every
    /// attempt. Only 200 and 206 responses are accepted; anything else
    /// becomes `DownloadError::HttpStatus`.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(
        &self,
        url: &str,
        resume_from: Option<u64>,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, DOWNLOAD_USER_AGENT)
            .header(ACCEPT, DOWNLOAD_ACCEPT)
            .header(ACCEPT_LANGUAGE, DOWNLOAD_ACCEPT_LANGUAGE);
        if let Some(offset) = resume_from {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if status.as_u16() != 200 && status.as_u16() != 206 {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        Ok(response)
    }

}

/// Result of a HEAD probe against a resource.
#[derive(Debug, Clone, Copy)]
pub struct ProbeResult {
    /// Whether the server advertised `Accept-Ranges: bytes`.
    pub supports_ranges: bool,
    /// The resource's total size, if the server reported `Content-Length`.
    pub total_size: Option<u64>,
    /// The raw HEAD response status code.
    pub status: u16,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_reports_range_support_and_size() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/file.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Accept-Ranges", "bytes")
                    .insert_header("Content-Length", "1024"),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/file.bin", server.uri());
        let result = client.probe(&url).await.unwrap();

        assert!(result.supports_ranges);
        assert_eq!(result.total_size, Some(1024));
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn test_probe_no_range_support() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", "512"))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/file.bin", server.uri());
        let result = client.probe(&url).await.unwrap();

        assert!(!result.supports_ranges);
        assert_eq!(result.total_size, Some(512));
    }

    #[tokio::test]
    async fn test_get_sends_stable_desktop_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .and(wiremock::matchers::header("user-agent", DOWNLOAD_USER_AGENT))
            .and(wiremock::matchers::header("accept", DOWNLOAD_ACCEPT))
            .and(wiremock::matchers::header("accept-language", DOWNLOAD_ACCEPT_LANGUAGE))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/file.bin", server.uri());
        let response = client.get(&url, None).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_get_success_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/file.bin", server.uri());
        let response = client.get(&url, None).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_get_resume_206() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"world".to_vec()))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/file.bin", server.uri());
        let response = client.get(&url, Some(6)).await.unwrap();
        assert_eq!(response.status().as_u16(), 206);
    }

    #[tokio::test]
    async fn test_get_error_status_becomes_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.bin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/missing.bin", server.uri());
        let err = client.get(&url, None).await.unwrap_err();
        match err {
            DownloadError::HttpStatus { status, .. } => assert_eq!(status, 404),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }
}
