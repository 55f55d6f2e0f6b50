//! Response value objects handed to the dashboard client.
//!
//! Every type here is produced by one resolver, stored by value in the
//! cache and serialized as camelCase JSON:
//! - [`NewsAggregate`] / [`NewsItem`]: merged feed items for one category
//! - [`EquityCandidate`], [`EquityQuote`], [`StockItem`], [`StocksAggregate`]: market data
//! - [`FxRate`] / [`FxSlot`]: USD/KRW rate, or a placeholder when it is unavailable
//! - [`WeatherSnapshot`]: current conditions, daily outlook and air quality
//! - [`Meta`]: the static catalog

use crate::config::{Category, Location};
use serde::{Deserialize, Serialize};

/// A single feed entry after normalization.
///
/// `link` (or `source_name:title` when empty) is the dedup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    /// Milliseconds since the Unix epoch; `0` when the date was missing or unparsable.
    pub published_at_ms: i64,
    /// The date string exactly as the feed carried it.
    pub published_raw: Option<String>,
    pub source_name: String,
    pub excerpt: String,
    pub image_url: Option<String>,
}

impl NewsItem {
    pub fn dedup_key(&self) -> String {
        if self.link.is_empty() {
            format!("{}:{}", self.source_name, self.title)
        } else {
            self.link.clone()
        }
    }
}

/// One source that contributed nothing because it failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedFailure {
    pub source_url: String,
    pub error: String,
}

/// Diagnostics about how many sources were attempted and which failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsMeta {
    pub feed_count: usize,
    pub failure_count: usize,
    /// The first few failures only.
    pub failures: Vec<FeedFailure>,
}

/// Deduplicated, newest-first items of one category.
///
/// Never an error: a category whose every source failed is an empty list
/// with `failure_count == feed_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsAggregate {
    pub category: Category,
    pub as_of: String,
    pub items: Vec<NewsItem>,
    pub meta: NewsMeta,
}

/// A listing-table row. `code` is the six-digit KRX code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityCandidate {
    pub code: String,
    pub name: String,
    /// `None` for the built-in fallback list.
    pub trading_value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    /// Direction implied by the sign of a change.
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Direction::Up
        } else if value < 0.0 {
            Direction::Down
        } else {
            Direction::Flat
        }
    }
}

/// Quote fields for one equity; each may be unresolved on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityQuote {
    pub price: Option<f64>,
    pub change_amount: Option<f64>,
    /// Absolute value; the sign lives in `direction`.
    pub change_percent: Option<f64>,
    pub direction: Option<Direction>,
    pub quote_url: String,
}

/// One row of the stocks response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockItem {
    pub code: String,
    pub name: String,
    #[serde(flatten)]
    pub quote: EquityQuote,
    pub price_usd: Option<f64>,
    pub change_usd: Option<f64>,
    /// Set when the quote page could not be fetched at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StockItem {
    /// Fill the USD columns from a KRW-per-USD rate.
    pub fn with_usd(mut self, usd_krw: Option<f64>) -> Self {
        let to_usd = |krw: Option<f64>| match (krw, usd_krw) {
            (Some(krw), Some(rate)) if rate > 0.0 => Some(krw / rate),
            _ => None,
        };
        self.price_usd = to_usd(self.quote.price);
        self.change_usd = to_usd(self.quote.change_amount.map(f64::abs));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxRate {
    pub base: String,
    pub quote: String,
    pub rate: f64,
    pub as_of: String,
    pub source_name: String,
}

/// Stand-in for an FX rate when every provider failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxUnavailable {
    pub base: String,
    pub quote: String,
    pub rate: Option<f64>,
    pub as_of: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FxSlot {
    Live(FxRate),
    Unavailable(FxUnavailable),
}

impl FxSlot {
    pub fn rate(&self) -> Option<f64> {
        match self {
            FxSlot::Live(fx) => Some(fx.rate),
            FxSlot::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StocksAggregate {
    pub as_of: String,
    pub fx: FxSlot,
    pub items: Vec<StockItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRef {
    pub id: String,
    pub label: String,
}

impl From<&Location> for LocationRef {
    fn from(loc: &Location) -> Self {
        Self {
            id: loc.id.clone(),
            label: loc.label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConditions {
    pub temp_c: Option<f64>,
    pub feels_c: Option<f64>,
    pub wind_ms: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub precip_mm: Option<f64>,
    pub precip_prob_pct: Option<f64>,
    pub code: Option<i64>,
    pub text: String,
    pub pm10: Option<f64>,
    #[serde(rename = "pm2_5")]
    pub pm2_5: Option<f64>,
    pub aq_as_of: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyOutlook {
    pub date: String,
    pub tmax: Option<f64>,
    pub tmin: Option<f64>,
    pub code: Option<i64>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub loc: LocationRef,
    pub as_of: String,
    pub current: CurrentConditions,
    pub daily: Vec<DailyOutlook>,
}

/// Static catalog for the client's pickers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub categories: Vec<Category>,
    pub locations: Vec<LocationRef>,
}
