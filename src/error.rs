//! Error taxonomy shared by every resolver.
//!
//! Errors are `Clone` because a single failed computation inside the
//! [`TtlCache`](crate::cache::TtlCache) is handed to every caller that was
//! coalesced onto it.

use thiserror::Error;

/// Failures raised while talking to an upstream source or interpreting what it returned.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// The request did not complete before its deadline and was cancelled.
    #[error("timed out after {timeout_ms}ms | {url}")]
    Timeout { url: String, timeout_ms: u64 },

    /// The upstream answered with a non-2xx status.
    #[error("HTTP {status} | {url}")]
    HttpStatus { status: u16, url: String },

    /// Connection, TLS, redirect or body transfer failure.
    #[error("network error: {0}")]
    Network(String),

    /// The payload is not in the expected format (e.g. HTML where a feed was expected).
    #[error("unexpected payload: {0}")]
    Shape(String),

    /// Structural or text extraction failed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Every fallback tier failed.
    #[error("all sources failed | {0}")]
    UpstreamExhausted(String),

    /// Invalid configuration or unusable local resources.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// `true` for the timeout / status / connection family.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::HttpStatus { .. } | Error::Network(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Error::HttpStatus {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => Error::Network(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(format!("invalid JSON: {e}"))
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Parse(format!("invalid XML: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_family() {
        assert!(
            Error::Timeout {
                url: "http://x".into(),
                timeout_ms: 10
            }
            .is_network()
        );
        assert!(
            Error::HttpStatus {
                status: 503,
                url: "http://x".into()
            }
            .is_network()
        );
        assert!(!Error::Shape("html".into()).is_network());
        assert!(!Error::UpstreamExhausted("a | b".into()).is_network());
    }

    #[test]
    fn test_display_carries_status_and_url() {
        let e = Error::HttpStatus {
            status: 404,
            url: "https://example.com/rss".into(),
        };
        assert_eq!(e.to_string(), "HTTP 404 | https://example.com/rss");
    }
}
