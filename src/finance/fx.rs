//! USD/KRW exchange rate.
//!
//! Primary tier scrapes the NAVER market-index page; the secondary tier reads
//! the open ER-API JSON. A non-positive or unparsable rate counts as a failure
//! of its tier.

use super::selector;
use crate::error::{Error, Result};
use crate::fallback::Tiers;
use crate::fetch::TextSource;
use crate::models::FxRate;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

pub const NAVER_FX_URL: &str =
    "https://finance.naver.com/marketindex/exchangeDetail.naver?code=FX_USDKRW";
pub const ER_API_URL: &str = "https://open.er-api.com/v6/latest/USD";

static RATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct ErApiLatest {
    #[serde(default)]
    rates: HashMap<String, f64>,
}

fn positive(rate: f64, raw: &str) -> Result<f64> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(Error::Parse(format!("NAVER FX parse failed: \"{raw}\"")))
    }
}

/// Rate from the NAVER exchange-detail page.
///
/// Takes the first `.no_today .blind` text holding a number, else the whole
/// `.no_today` text, and parses the first numeric token in it.
pub fn parse_naver_rate(html: &str) -> Result<f64> {
    let document = Html::parse_document(html);
    let blind_sel = selector(".no_today .blind")?;
    let block_sel = selector(".no_today")?;

    let raw = document
        .select(&blind_sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|t| RATE_TOKEN.is_match(t))
        .or_else(|| {
            document
                .select(&block_sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default();

    let rate = RATE_TOKEN
        .find(&raw)
        .and_then(|token| token.as_str().replace(',', "").parse::<f64>().ok())
        .unwrap_or(0.0);
    positive(rate, &raw)
}

/// `rates.KRW` from an ER-API `latest/USD` document.
pub fn parse_er_api_rate(json: &str) -> Result<f64> {
    let latest: ErApiLatest = serde_json::from_str(json)?;
    match latest.rates.get("KRW") {
        Some(&rate) if rate.is_finite() && rate > 0.0 => Ok(rate),
        Some(rate) => Err(Error::Parse(format!("ER-API invalid KRW rate {rate}"))),
        None => Err(Error::Shape("ER-API response has no rates.KRW".into())),
    }
}

/// Resolves the live USD/KRW rate through two tiers.
#[derive(Clone)]
pub struct FxResolver {
    source: Arc<dyn TextSource>,
    timeout: Duration,
}

impl FxResolver {
    pub fn new(source: Arc<dyn TextSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    async fn naver(&self) -> Result<f64> {
        let fetched = self.source.fetch_text(NAVER_FX_URL, self.timeout).await?;
        parse_naver_rate(&fetched.body)
    }

    async fn er_api(&self) -> Result<f64> {
        let fetched = self.source.fetch_text(ER_API_URL, self.timeout).await?;
        parse_er_api_rate(&fetched.body)
    }

    /// The current rate, tagged with the tier that produced it.
    ///
    /// # Errors
    ///
    /// [`Error::UpstreamExhausted`] naming both tiers when neither produced a
    /// positive rate.
    #[instrument(level = "info", skip_all)]
    pub async fn usd_krw(&self) -> Result<FxRate> {
        let resolved = Tiers::new()
            .or_try("NAVER", self.naver())
            .or_try("ER-API", self.er_api())
            .resolve()
            .await?;

        info!(rate = resolved.value, source = resolved.tier, "Resolved USD/KRW");
        Ok(FxRate {
            base: "USD".into(),
            quote: "KRW".into(),
            rate: resolved.value,
            as_of: Utc::now().to_rfc3339(),
            source_name: resolved.tier.into(),
        })
    }
}
