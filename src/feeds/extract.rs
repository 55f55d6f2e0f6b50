//! Turning a [`RawEntry`] into a [`NewsItem`].

use super::parse::RawEntry;
use crate::models::NewsItem;
use crate::utils::strip_html;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

/// Label used when neither the entry nor the feed names a source.
pub const GENERIC_SOURCE: &str = "뉴스";

const KST_OFFSET_SECS: i32 = 9 * 3600;

static IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).expect("valid regex"));

/// Naive layouts seen in Korean feeds; read as KST.
const NAIVE_LAYOUTS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y.%m.%d %H:%M:%S",
];

/// Milliseconds since the epoch for an RSS/Atom date, or `0`.
///
/// Accepts RFC 2822 (with `KST` as an alias for `+0900`), RFC 3339, and a few
/// naive layouts interpreted as KST. Pre-epoch dates clamp to `0`.
pub fn parse_date_ms(raw: Option<&str>) -> i64 {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return 0;
    };

    let rfc2822 = match s.strip_suffix(" KST") {
        Some(head) => format!("{head} +0900"),
        None => s.to_string(),
    };

    DateTime::parse_from_rfc2822(&rfc2822)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.timestamp_millis())
        .ok()
        .or_else(|| parse_naive_kst(s))
        .map(|ms| ms.max(0))
        .unwrap_or(0)
}

fn parse_naive_kst(s: &str) -> Option<i64> {
    let kst = FixedOffset::east_opt(KST_OFFSET_SECS)?;
    NAIVE_LAYOUTS.iter().find_map(|layout| {
        NaiveDateTime::parse_from_str(s, layout)
            .ok()
            .and_then(|naive| kst.from_local_datetime(&naive).single())
            .map(|dt| dt.timestamp_millis())
    })
}

fn first_img_src(html: &str) -> Option<String> {
    IMG_SRC
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Best-effort image: enclosure, media:content, media:thumbnail, then the
/// first `<img src>` in any HTML-bearing field.
pub fn extract_image_url(entry: &RawEntry) -> Option<String> {
    entry
        .enclosure_url
        .clone()
        .or_else(|| entry.media_content_url.clone())
        .or_else(|| entry.media_thumbnail_url.clone())
        .or_else(|| {
            [
                &entry.content_encoded,
                &entry.content,
                &entry.description,
                &entry.summary,
            ]
            .into_iter()
            .flatten()
            .find_map(|html| first_img_src(html))
        })
}

/// Explicit source title, else author, else the feed's own title, else [`GENERIC_SOURCE`].
pub fn infer_source(entry: &RawEntry, feed_title: Option<&str>) -> String {
    entry
        .source_title
        .as_deref()
        .or(entry.creator.as_deref())
        .or(feed_title.filter(|t| !t.trim().is_empty()))
        .unwrap_or(GENERIC_SOURCE)
        .trim()
        .to_string()
}

/// Normalize one entry; entries without a title or link are dropped.
pub fn to_news_item(entry: &RawEntry, feed_title: Option<&str>) -> Option<NewsItem> {
    let title = entry.title.as_deref()?.trim();
    let link = entry
        .link
        .as_deref()
        .or(entry.guid.as_deref())
        .map(str::trim)
        .unwrap_or("");
    if title.is_empty() || link.is_empty() {
        return None;
    }

    let published_raw = entry
        .pub_date
        .as_ref()
        .or(entry.iso_date.as_ref())
        .or(entry.updated.as_ref())
        .cloned();

    let body = entry
        .description
        .as_deref()
        .or(entry.content_encoded.as_deref())
        .or(entry.content.as_deref())
        .or(entry.summary.as_deref())
        .unwrap_or("");

    Some(NewsItem {
        title: title.to_string(),
        link: link.to_string(),
        published_at_ms: parse_date_ms(published_raw.as_deref()),
        published_raw,
        source_name: infer_source(entry, feed_title),
        excerpt: strip_html(body),
        image_url: extract_image_url(entry),
    })
}
