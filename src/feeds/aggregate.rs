//! Fan-out over a category's feeds with per-source failure isolation.

use super::extract::to_news_item;
use super::parse::{ensure_feed_shape, parse_feed};
use crate::config::{Category, Settings};
use crate::error::Result;
use crate::fetch::TextSource;
use crate::models::{FeedFailure, NewsAggregate, NewsItem, NewsMeta};
use crate::utils::truncate_for_log;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Fetches, validates and parses every feed of a category, then merges the items.
#[derive(Clone)]
pub struct FeedAggregator {
    source: Arc<dyn TextSource>,
    timeout: Duration,
    max_items: usize,
    sample_failures: usize,
    concurrency: usize,
}

impl std::fmt::Debug for FeedAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedAggregator")
            .field("timeout", &self.timeout)
            .field("max_items", &self.max_items)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl FeedAggregator {
    pub fn new(source: Arc<dyn TextSource>, settings: &Settings) -> Self {
        Self {
            source,
            timeout: settings.fetch_timeout(),
            max_items: settings.max_news_items,
            sample_failures: settings.sample_failures,
            concurrency: settings.concurrency(),
        }
    }

    /// Aggregate `feeds` for `category`.
    ///
    /// Never fails. Every feed is attempted; a feed that cannot be fetched,
    /// is not shaped like RSS/Atom, or does not parse is recorded in
    /// `meta.failures` and contributes no items. Items are deduplicated by
    /// [`NewsItem::dedup_key`] (first occurrence in feed order wins), sorted
    /// newest first with undated items last, and capped.
    #[instrument(level = "info", skip(self, feeds), fields(category = %category.id, feeds = feeds.len()))]
    pub async fn aggregate(&self, category: Category, feeds: &[String]) -> NewsAggregate {
        let t0 = Instant::now();

        // `buffered` keeps feed order, which decides which duplicate survives.
        let outcomes: Vec<(String, Result<Vec<NewsItem>>)> = stream::iter(feeds.iter().cloned())
            .map(|url| async move {
                let outcome = self.collect_feed(&url).await;
                (url, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut items = Vec::new();
        let mut failures = Vec::new();
        for (url, outcome) in outcomes {
            match outcome {
                Ok(mut feed_items) => {
                    debug!(%url, count = feed_items.len(), "Collected feed items");
                    items.append(&mut feed_items);
                }
                Err(e) => {
                    warn!(%url, error = %e, "Feed failed; skipping");
                    failures.push(FeedFailure {
                        source_url: url,
                        error: e.to_string(),
                    });
                }
            }
        }

        let collected = items.len();
        let items = rank_items(items, self.max_items);
        let failure_count = failures.len();
        failures.truncate(self.sample_failures);

        info!(
            collected,
            kept = items.len(),
            failure_count,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "News aggregate built"
        );

        NewsAggregate {
            category,
            as_of: Utc::now().to_rfc3339(),
            items,
            meta: NewsMeta {
                feed_count: feeds.len(),
                failure_count,
                failures,
            },
        }
    }

    async fn collect_feed(&self, url: &str) -> Result<Vec<NewsItem>> {
        let fetched = self.source.fetch_text(url, self.timeout).await?;
        if let Err(e) = ensure_feed_shape(&fetched.body) {
            debug!(%url, preview = %truncate_for_log(&fetched.body, 200), "Payload is not a feed");
            return Err(e);
        }
        let feed = parse_feed(&fetched.body)?;
        let feed_title = feed.title.as_deref();
        Ok(feed
            .entries
            .iter()
            .filter_map(|entry| to_news_item(entry, feed_title))
            .collect())
    }
}

/// Dedup (first wins), sort newest first, truncate to `max`.
///
/// The sort is stable, so equal timestamps keep feed order; `0` (unknown)
/// sorts after every real date.
pub fn rank_items(items: Vec<NewsItem>, max: usize) -> Vec<NewsItem> {
    let mut ranked: Vec<NewsItem> = items
        .into_iter()
        .unique_by(NewsItem::dedup_key)
        .collect();
    ranked.sort_by(|a, b| b.published_at_ms.cmp(&a.published_at_ms));
    ranked.truncate(max);
    ranked
}
