//! Small text helpers shared by the feed and finance extractors, plus the
//! output-directory check used by the snapshot command.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use quick_xml::escape::{resolve_xml_entity, unescape_with};
use regex::Regex;
use std::borrow::Cow;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script.*?</script>").expect("valid regex"));
static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style.*?</style>").expect("valid regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[^>]+>").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static FIRST_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]{1,3}(?:,[0-9]{3})+|[0-9]+)").expect("valid regex"));
static PERCENT_SIGN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+-]?\d+(?:\.\d+)?)\s*%").expect("valid regex"));
static PERCENT_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+-]?\d+(?:\.\d+)?)\s*퍼센트").expect("valid regex"));

/// Plain text from an HTML fragment.
///
/// Drops `<script>`/`<style>` blocks, replaces every tag with a space,
/// decodes the handful of entities that survive feed unescaping and
/// collapses whitespace.
pub fn strip_html(html: &str) -> String {
    let without_scripts = SCRIPT_BLOCK.replace_all(html, "");
    let without_styles = STYLE_BLOCK.replace_all(&without_scripts, "");
    let without_tags = TAG.replace_all(&without_styles, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// Resolve `&name;` references in `text` through `quick-xml`.
///
/// XML's predefined entities, `&nbsp;` and character references are decoded.
/// Anything `quick-xml` rejects (unknown names like `&copy;`, a bare `&`) is
/// kept verbatim, since feed and page text is routinely mis-escaped.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail[1..].find(';').filter(|&semi| semi > 0 && semi <= 10) {
            Some(semi) => {
                let reference = &tail[..semi + 2];
                match unescape_with(reference, resolve_entity) {
                    Ok(decoded) => out.push_str(&decoded),
                    Err(_) => out.push_str(reference),
                }
                rest = &tail[semi + 2..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn resolve_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some(" "),
        _ => resolve_xml_entity(name),
    }
}

/// Number from a KRW-formatted token (`"1,234"`, `"-56.7"`, `"₩ 3,000원"`).
///
/// Everything except digits, `.` and `-` is discarded before parsing.
pub fn parse_krw_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// First integer-looking token (optionally comma-grouped) across `texts`.
pub fn pick_first_number<S: AsRef<str>>(texts: &[S]) -> Option<String> {
    texts.iter().find_map(|t| {
        FIRST_NUMBER
            .captures(t.as_ref())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// First signed percentage across `texts`: `"1.52%"` first, then `"1.52 퍼센트"`.
pub fn pick_percent<S: AsRef<str>>(texts: &[S]) -> Option<f64> {
    [&*PERCENT_SIGN, &*PERCENT_WORD].iter().find_map(|re| {
        texts.iter().find_map(|t| {
            re.captures(t.as_ref())
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
        })
    })
}

/// Truncate a string for logging purposes.
///
/// Cuts on a character boundary at or below `max` bytes and appends the
/// number of bytes dropped.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
///
/// # Errors
///
/// [`Error::Config`] if the directory cannot be created or written.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| Error::Config(format!("cannot create {path}: {e}")))?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Error::Config(format!("{path} is not writable: {e}"))),
    }
}
