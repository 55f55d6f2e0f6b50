//! The request surface: one method per dashboard resource.
//!
//! [`Dashboard`] owns a [`TtlCache`] per resource type and the resolvers that
//! fill them. It is a cheap handle (`Clone` shares the same caches), so the
//! same instance can serve concurrent requests; concurrent misses for the same
//! key are coalesced by the cache.
//!
//! | Method | Cache key | TTL setting | Fails? |
//! |--------|-----------|-------------|--------|
//! | [`Dashboard::news`] | `news:{category}` | `news_ttl_secs` | never |
//! | [`Dashboard::weather`] | `weather:{location}` | `weather_ttl_secs` | forecast unavailable |
//! | [`Dashboard::fx`] | `fx:usdkrw` | `fx_ttl_secs` | both FX tiers failed |
//! | [`Dashboard::top_equities`] | `stocks:topdeal:{limit}` | `ranking_ttl_secs` | never |
//! | [`Dashboard::stocks`] | `stocks:kr:topdeal` | `stocks_ttl_secs` | never |
//! | [`Dashboard::meta`] | (not cached) | | never |

use crate::cache::TtlCache;
use crate::config::DashboardConfig;
use crate::error::{Error, Result};
use crate::feeds::FeedAggregator;
use crate::fetch::{Fetcher, TextSource};
use crate::finance::FxResolver;
use crate::finance::quote::quote_item;
use crate::finance::ranking::{fallback_candidates, top_traded_equities};
use crate::models::{
    EquityCandidate, FxRate, FxSlot, FxUnavailable, LocationRef, Meta, NewsAggregate,
    StockItem, StocksAggregate, WeatherSnapshot,
};
use crate::weather::WeatherResolver;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, instrument, warn};

struct Inner {
    config: DashboardConfig,
    source: Arc<dyn TextSource>,
    feeds: FeedAggregator,
    fx: FxResolver,
    weather: WeatherResolver,
    news_cache: TtlCache<NewsAggregate>,
    weather_cache: TtlCache<WeatherSnapshot>,
    fx_cache: TtlCache<FxRate>,
    ranking_cache: TtlCache<Vec<EquityCandidate>>,
    stocks_cache: TtlCache<StocksAggregate>,
}

/// Cached access to every resource of the dashboard.
#[derive(Clone)]
pub struct Dashboard {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("settings", &self.inner.config.settings)
            .field("news_cache", &self.inner.news_cache)
            .field("stocks_cache", &self.inner.stocks_cache)
            .finish()
    }
}

impl Dashboard {
    /// Build a dashboard that fetches through `source`.
    pub fn new(config: DashboardConfig, source: Arc<dyn TextSource>) -> Self {
        let settings = &config.settings;
        let timeout = settings.fetch_timeout();
        let inner = Inner {
            feeds: FeedAggregator::new(source.clone(), settings),
            fx: FxResolver::new(source.clone(), timeout),
            weather: WeatherResolver::new(source.clone(), timeout),
            source,
            news_cache: TtlCache::new(),
            weather_cache: TtlCache::new(),
            fx_cache: TtlCache::new(),
            ranking_cache: TtlCache::new(),
            stocks_cache: TtlCache::new(),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Build a dashboard backed by the real HTTP [`Fetcher`].
    pub fn with_fetcher(config: DashboardConfig) -> Result<Self> {
        let fetcher = Fetcher::new()?;
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.inner.config
    }

    /// News for `category_id`; unknown ids are served from the default category.
    ///
    /// Individual feed failures are reported in `meta`, never as an error.
    #[instrument(level = "info", skip(self))]
    pub async fn news(&self, category_id: &str) -> Result<NewsAggregate> {
        let catalog = &self.inner.config.catalog;
        let category = catalog.category(category_id);
        let feeds = catalog.feeds_for(&category.id).to_vec();
        let key = format!("news:{}", category.id);
        let aggregator = self.inner.feeds.clone();

        self.inner
            .news_cache
            .get_or_compute(&key, self.inner.config.settings.news_ttl(), move || async move {
                Ok(aggregator.aggregate(category, &feeds).await)
            })
            .await
    }

    /// Weather for `location_id`; unknown ids are served from the first location.
    ///
    /// # Errors
    ///
    /// * [`Error::Config`] when the catalog has no locations at all.
    /// * Whatever the forecast request failed with.
    #[instrument(level = "info", skip(self))]
    pub async fn weather(&self, location_id: &str) -> Result<WeatherSnapshot> {
        let location = self
            .inner
            .config
            .catalog
            .location(location_id)
            .cloned()
            .ok_or_else(|| Error::Config("no weather locations configured".into()))?;
        let key = format!("weather:{}", location.id);
        let resolver = self.inner.weather.clone();

        self.inner
            .weather_cache
            .get_or_compute(&key, self.inner.config.settings.weather_ttl(), move || async move {
                resolver.snapshot(&location).await
            })
            .await
    }

    /// The live USD/KRW rate.
    ///
    /// # Errors
    ///
    /// [`Error::UpstreamExhausted`] when both FX tiers failed.
    #[instrument(level = "info", skip(self))]
    pub async fn fx(&self) -> Result<FxRate> {
        let resolver = self.inner.fx.clone();
        self.inner
            .fx_cache
            .get_or_compute("fx:usdkrw", self.inner.config.settings.fx_ttl(), move || async move {
                resolver.usd_krw().await
            })
            .await
    }

    /// Up to `limit` equities by trading value; the built-in list when ranking found nothing.
    #[instrument(level = "info", skip(self))]
    pub async fn top_equities(&self, limit: usize) -> Vec<EquityCandidate> {
        let key = format!("stocks:topdeal:{limit}");
        let source = self.inner.source.clone();
        let timeout = self.inner.config.settings.fetch_timeout();

        self.inner
            .ranking_cache
            .get_or_compute(&key, self.inner.config.settings.ranking_ttl(), move || async move {
                Ok(top_traded_equities(source.as_ref(), timeout, limit).await)
            })
            .await
            .unwrap_or_else(|_| fallback_candidates(limit))
    }

    /// FX rate (or a placeholder) plus quotes for the top traded equities.
    ///
    /// Never fails: a missing FX rate becomes [`FxSlot::Unavailable`] and a
    /// failed quote becomes a row with `error` set.
    #[instrument(level = "info", skip(self))]
    pub async fn stocks(&self) -> Result<StocksAggregate> {
        let this = self.clone();
        self.inner
            .stocks_cache
            .get_or_compute(
                "stocks:kr:topdeal",
                self.inner.config.settings.stocks_ttl(),
                move || async move { Ok(this.build_stocks().await) },
            )
            .await
    }

    async fn build_stocks(&self) -> StocksAggregate {
        let fx = match self.fx().await {
            Ok(rate) => FxSlot::Live(rate),
            Err(e) => {
                warn!(error = %e, "FX unavailable; stocks served without conversion");
                FxSlot::Unavailable(FxUnavailable {
                    base: "USD".into(),
                    quote: "KRW".into(),
                    rate: None,
                    as_of: Utc::now().to_rfc3339(),
                    error: e.to_string(),
                })
            }
        };
        let usd_krw = fx.rate();

        let settings = &self.inner.config.settings;
        let candidates = self.top_equities(settings.top_equities).await;
        let source = self.inner.source.as_ref();
        let timeout = settings.fetch_timeout();

        let items: Vec<StockItem> = stream::iter(candidates)
            .map(|candidate| quote_item(source, candidate, timeout))
            .buffered(settings.concurrency())
            .map(|item| item.with_usd(usd_krw))
            .collect()
            .await;

        let failed = items.iter().filter(|i| i.error.is_some()).count();
        info!(count = items.len(), failed, fx_live = usd_krw.is_some(), "Stocks aggregate built");

        StocksAggregate {
            as_of: Utc::now().to_rfc3339(),
            fx,
            items,
        }
    }

    /// Categories and locations for the client's pickers.
    pub fn meta(&self) -> Meta {
        let catalog = &self.inner.config.catalog;
        Meta {
            categories: catalog.categories.clone(),
            locations: catalog.locations.iter().map(LocationRef::from).collect(),
        }
    }
}
