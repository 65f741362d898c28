//! Shared client headers for the download worker's GET requests.
//!
//! Grounded in `original_source/internal/downloader/download.go`'s
//! `performDownload`: a generic desktop browser User-Agent plus a
//! permissive `Accept`/`Accept-Language` pair, set once and reused
//! unchanged across attempts and retries (spec.md §4.2 step 2, §6).

/// Generic desktop User-Agent string, chosen for broad server
/// compatibility rather than to identify this tool.
pub(crate) const DOWNLOAD_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// `Accept` header value sent with every GET.
pub(crate) const DOWNLOAD_ACCEPT: &str = "*/*";

/// `Accept-Language` header value sent with every GET.
pub(crate) const DOWNLOAD_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_identifies_as_a_desktop_browser() {
        assert!(DOWNLOAD_USER_AGENT.contains("Mozilla/5.0"));
        assert!(DOWNLOAD_USER_AGENT.contains("Chrome"));
    }

    #[test]
    fn test_accept_headers_are_permissive() {
        assert_eq!(DOWNLOAD_ACCEPT, "*/*");
        assert_eq!(DOWNLOAD_ACCEPT_LANGUAGE, "en-US,en;q=0.9");
    }
}
