//! HTTP text fetching with charset normalization.
//!
//! Korean publishers still serve a good share of their feeds and pages in
//! EUC-KR / CP949, often without saying so in the `Content-Type` header. The
//! [`Fetcher`] downloads raw bytes and decodes them with a charset resolved in
//! this order:
//!
//! 1. `charset=` parameter of the `Content-Type` header
//! 2. a `charset=` hint sniffed from the first 4 KB of the body (read as Latin-1)
//! 3. UTF-8
//!
//! Decoding is total: an unknown or unusable charset falls back to UTF-8 and
//! invalid sequences become U+FFFD instead of failing the call.
//!
//! The classification functions ([`resolve_charset`], [`normalize_charset`],
//! [`decode_body`]) are pure so they can be tested without a network.

use crate::error::{Error, Result};
use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) local-feed/1.0";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en;q=0.8";
const REFERER: &str = "https://finance.naver.com/";

/// How many leading bytes are scanned for an in-document charset hint.
const SNIFF_WINDOW: usize = 4096;

static HEADER_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)charset=([^;]+)").expect("valid regex"));
static DOCUMENT_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"charset=["']?([a-z0-9\-_]+)"#).expect("valid regex"));

/// Where the charset used for decoding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetOrigin {
    Header,
    Document,
    Default,
}

/// A decoded response body. Transient: never cached on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedText {
    pub body: String,
    /// Canonical name of the encoding actually used (e.g. `"EUC-KR"`).
    pub charset: &'static str,
    pub origin: CharsetOrigin,
}

impl FetchedText {
    /// Wrap an already-decoded UTF-8 string.
    pub fn utf8(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            charset: UTF_8.name(),
            origin: CharsetOrigin::Default,
        }
    }
}

/// Anything that can turn a URL into decoded text.
///
/// Every resolver depends on this seam rather than on [`Fetcher`] so the
/// aggregation logic can run against canned payloads.
#[async_trait]
pub trait TextSource: Send + Sync {
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<FetchedText>;
}

/// Browser-like HTTP client used for every upstream source.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Build a client with a desktop User-Agent and Korean-locale `Accept-Language`.
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE),
        );
        headers.insert(header::REFERER, HeaderValue::from_static(REFERER));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    /// GET `url` and decode the body.
    ///
    /// # Errors
    ///
    /// * [`Error::Timeout`] if the whole exchange (headers and body) takes longer
    ///   than `timeout`; the in-flight request is dropped.
    /// * [`Error::HttpStatus`] for any non-2xx status.
    /// * [`Error::Network`] for connection-level failures.
    #[instrument(level = "debug", skip(self), fields(%url))]
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedText> {
        let t0 = Instant::now();
        let exchange = async {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let bytes = response.bytes().await?;
            Ok::<_, Error>((content_type, bytes))
        };

        let (content_type, bytes) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| Error::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;

        let fetched = decode_body(content_type.as_deref(), &bytes);
        debug!(
            bytes = bytes.len(),
            charset = fetched.charset,
            origin = ?fetched.origin,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched text"
        );
        Ok(fetched)
    }
}

#[async_trait]
impl TextSource for Fetcher {
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<FetchedText> {
        self.fetch(url, timeout).await
    }
}

/// Map the aliases seen in the wild onto one label per codec.
///
/// `euc-kr`, `ks_c_5601-1987` and `cp949` all become `euc-kr`; `utf8` becomes `utf-8`.
/// Anything else is lowercased and stripped of quotes and whitespace.
pub fn normalize_charset(label: &str) -> String {
    let c = label
        .trim()
        .trim_matches(|ch| ch == '"' || ch == '\'')
        .trim()
        .to_ascii_lowercase();
    match c.as_str() {
        "euc-kr" | "ks_c_5601-1987" | "cp949" => "euc-kr".to_string(),
        "utf8" => "utf-8".to_string(),
        _ => c,
    }
}

/// Charset from a `Content-Type` header value, normalized.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    HEADER_CHARSET
        .captures(content_type)
        .and_then(|c| c.get(1))
        .map(|m| normalize_charset(m.as_str()))
        .filter(|c| !c.is_empty())
}

/// Charset hint from the head of the raw document, normalized.
pub fn sniff_charset(bytes: &[u8]) -> Option<String> {
    let head: String = bytes
        .iter()
        .take(SNIFF_WINDOW)
        .map(|&b| (b as char).to_ascii_lowercase())
        .collect();
    DOCUMENT_CHARSET
        .captures(&head)
        .and_then(|c| c.get(1))
        .map(|m| normalize_charset(m.as_str()))
}

/// Pick the charset label for a body, with its origin.
pub fn resolve_charset(content_type: Option<&str>, bytes: &[u8]) -> (String, CharsetOrigin) {
    if let Some(cs) = content_type.and_then(charset_from_content_type) {
        return (cs, CharsetOrigin::Header);
    }
    if let Some(cs) = sniff_charset(bytes) {
        return (cs, CharsetOrigin::Document);
    }
    ("utf-8".to_string(), CharsetOrigin::Default)
}

/// Decode raw bytes. Never fails.
pub fn decode_body(content_type: Option<&str>, bytes: &[u8]) -> FetchedText {
    let (label, origin) = resolve_charset(content_type, bytes);
    let encoding = Encoding::for_label_no_replacement(label.as_bytes()).unwrap_or_else(|| {
        debug!(%label, "Unknown charset; decoding as UTF-8");
        UTF_8
    });

    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors && used != UTF_8 {
        if let Ok(utf8) = std::str::from_utf8(bytes) {
            debug!(declared = used.name(), "Declared charset failed; body is valid UTF-8");
            return FetchedText {
                body: utf8.to_string(),
                charset: UTF_8.name(),
                origin,
            };
        }
    }
    FetchedText {
        body: text.into_owned(),
        charset: used.name(),
        origin,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::EUC_KR;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const KOREAN: &str = "오늘의 경제 뉴스: 코스피 상승";

    fn euc_kr_bytes(s: &str) -> Vec<u8> {
        let (bytes, _, had_errors) = EUC_KR.encode(s);
        assert!(!had_errors);
        bytes.into_owned()
    }

    #[test]
    fn test_normalize_charset_aliases() {
        assert_eq!(normalize_charset("EUC-KR"), "euc-kr");
        assert_eq!(normalize_charset(" ks_c_5601-1987 "), "euc-kr");
        assert_eq!(normalize_charset("CP949"), "euc-kr");
        assert_eq!(normalize_charset("utf8"), "utf-8");
        assert_eq!(normalize_charset("\"UTF-8\""), "utf-8");
        assert_eq!(normalize_charset("iso-8859-1"), "iso-8859-1");
    }

    #[test]
    fn test_korean_aliases_decode_identically() {
        let bytes = euc_kr_bytes(KOREAN);
        for declared in ["euc-kr", "cp949", "ks_c_5601-1987"] {
            let ct = format!("text/xml; charset={declared}");
            let decoded = decode_body(Some(&ct), &bytes);
            assert_eq!(decoded.body, KOREAN, "declared {declared}");
            assert_eq!(decoded.charset, "EUC-KR");
            assert_eq!(decoded.origin, CharsetOrigin::Header);
        }
    }

    #[test]
    fn test_header_wins_over_document_hint() {
        let mut bytes = b"<?xml version=\"1.0\" encoding=\"utf-8\"?><meta charset=\"utf-8\">".to_vec();
        bytes.extend(euc_kr_bytes(KOREAN));
        let (label, origin) = resolve_charset(Some("text/html; charset=cp949"), &bytes);
        assert_eq!(label, "euc-kr");
        assert_eq!(origin, CharsetOrigin::Header);
    }

    #[test]
    fn test_sniffed_document_hint() {
        let mut bytes =
            b"<html><head><meta http-equiv=\"Content-Type\" content=\"text/html; charset=EUC-KR\"></head><body>"
                .to_vec();
        bytes.extend(euc_kr_bytes(KOREAN));
        bytes.extend(b"</body></html>");

        let decoded = decode_body(Some("text/html"), &bytes);
        assert_eq!(decoded.origin, CharsetOrigin::Document);
        assert!(decoded.body.contains(KOREAN));
    }

    #[test]
    fn test_hint_beyond_sniff_window_is_ignored() {
        let mut bytes = vec![b' '; SNIFF_WINDOW];
        bytes.extend(b"<meta charset=euc-kr>");
        assert_eq!(sniff_charset(&bytes), None);
    }

    #[test]
    fn test_undeclared_body_defaults_to_utf8() {
        let decoded = decode_body(None, KOREAN.as_bytes());
        assert_eq!(decoded.body, KOREAN);
        assert_eq!(decoded.charset, "UTF-8");
        assert_eq!(decoded.origin, CharsetOrigin::Default);
    }

    #[test]
    fn test_unknown_charset_falls_back_to_utf8() {
        let decoded = decode_body(Some("text/plain; charset=x-made-up"), KOREAN.as_bytes());
        assert_eq!(decoded.body, KOREAN);
        assert_eq!(decoded.charset, "UTF-8");
    }

    #[test]
    fn test_mislabelled_utf8_body_is_recovered() {
        let body = "<title>가</title>";
        let decoded = decode_body(Some("application/rss+xml; charset=euc-kr"), body.as_bytes());
        assert_eq!(decoded.body, body);
        assert_eq!(decoded.charset, "UTF-8");
        assert_eq!(decoded.origin, CharsetOrigin::Header);
    }

    #[test]
    fn test_invalid_bytes_never_fail() {
        let decoded = decode_body(None, &[0xc3, 0x28, b'a']);
        assert!(decoded.body.ends_with('a'));
    }

    async fn serve_once(head: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let mut response = format!(
                "{head}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .into_bytes();
            response.extend_from_slice(&body);
            socket.write_all(&response).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/rss")
    }

    #[tokio::test]
    async fn test_fetch_decodes_declared_legacy_charset() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/rss+xml; charset=ks_c_5601-1987",
            euc_kr_bytes(KOREAN),
        )
        .await;
        let fetched = Fetcher::new()
            .unwrap()
            .fetch(&url, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(fetched.body, KOREAN);
        assert_eq!(fetched.charset, "EUC-KR");
    }

    #[tokio::test]
    async fn test_fetch_non_2xx_is_http_status_error() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Type: text/html",
            b"busy".to_vec(),
        )
        .await;
        let err = Fetcher::new()
            .unwrap()
            .fetch(&url, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let err = Fetcher::new()
            .unwrap()
            .fetch(&format!("http://{addr}/slow"), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { timeout_ms: 200, .. }));
        assert!(err.is_network());
    }
}
