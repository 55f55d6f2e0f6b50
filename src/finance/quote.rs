//! Per-equity quote extraction.
//!
//! Two passes over the same page, applied field by field:
//!
//! 1. structural: the accessibility (`.blind`) texts inside the `.no_today`
//!    (current price) and `.no_exday` (change vs. previous close) blocks
//! 2. text: regexes over the tag-stripped page for `현재가`, `전일대비` and
//!    `퍼센트`, consulted only for fields the structural pass left empty

use super::selector;
use crate::error::Result;
use crate::fetch::TextSource;
use crate::models::{Direction, EquityCandidate, EquityQuote, StockItem};
use crate::utils::{parse_krw_number, pick_first_number, pick_percent, strip_html};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const QUOTE_PAGE: &str = "https://finance.naver.com/item/main.naver";

static TEXT_PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"현재가\s*([\d,]+)").expect("valid regex"));
static TEXT_CHANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"전일대비\s*(상승|하락|보합)\s*([\d,]+)").expect("valid regex"));
static TEXT_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\d.]+)\s*퍼센트").expect("valid regex"));

pub fn quote_url(code: &str) -> String {
    format!("{QUOTE_PAGE}?code={code}")
}

fn direction_marker(text: &str) -> Option<Direction> {
    if text.contains("상승") {
        Some(Direction::Up)
    } else if text.contains("하락") {
        Some(Direction::Down)
    } else if text.contains("보합") {
        Some(Direction::Flat)
    } else {
        None
    }
}

/// Field values found by one extraction pass; any may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
struct Partial {
    price: Option<f64>,
    change_amount: Option<f64>,
    change_percent: Option<f64>,
    direction: Option<Direction>,
}

impl Partial {
    fn is_complete(&self) -> bool {
        self.price.is_some() && self.change_amount.is_some() && self.change_percent.is_some()
    }

    /// Fill only the fields still missing in `self`.
    fn or(self, fallback: Partial) -> Partial {
        Partial {
            price: self.price.or(fallback.price),
            change_amount: self.change_amount.or(fallback.change_amount),
            change_percent: self.change_percent.or(fallback.change_percent),
            direction: self.direction.or(fallback.direction),
        }
    }
}

fn blind_texts(document: &Html, css: &str) -> Result<Vec<String>> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect())
}

fn structural_pass(html: &str) -> Result<Partial> {
    let document = Html::parse_document(html);
    let today = blind_texts(&document, ".no_today .blind")?;
    let exday = blind_texts(&document, ".no_exday .blind")?;

    let price = pick_first_number(&today).and_then(|n| parse_krw_number(&n));

    let marker = ["상승", "하락", "보합"]
        .iter()
        .find_map(|word| exday.iter().find(|t| t.contains(word)))
        .and_then(|t| direction_marker(t));

    let change_amount = exday
        .iter()
        .filter(|t| !t.contains('%') && !t.contains("퍼센트"))
        .find_map(|t| parse_krw_number(t));

    let signed_percent = pick_percent(&exday);

    Ok(Partial {
        price,
        change_amount,
        change_percent: signed_percent.map(f64::abs),
        direction: marker.or(signed_percent.map(Direction::from_sign)),
    })
}

fn text_pass(html: &str) -> Partial {
    let text = strip_html(html);
    let capture = |re: &Regex, group: usize| {
        re.captures(&text)
            .and_then(|c| c.get(group))
            .map(|m| m.as_str().to_string())
    };

    Partial {
        price: capture(&TEXT_PRICE, 1).and_then(|n| parse_krw_number(&n)),
        change_amount: capture(&TEXT_CHANGE, 2).and_then(|n| parse_krw_number(&n)),
        change_percent: capture(&TEXT_PERCENT, 1).and_then(|n| n.parse::<f64>().ok()),
        direction: capture(&TEXT_CHANGE, 1).and_then(|w| direction_marker(&w)),
    }
}

/// Extract a quote from an equity page; structural values always win.
pub fn parse_quote(html: &str, code: &str) -> Result<EquityQuote> {
    let mut fields = structural_pass(html)?;
    if !fields.is_complete() {
        debug!(%code, "Structural quote incomplete; consulting page text");
        fields = fields.or(text_pass(html));
    }
    Ok(EquityQuote {
        price: fields.price,
        change_amount: fields.change_amount,
        change_percent: fields.change_percent,
        direction: fields.direction,
        quote_url: quote_url(code),
    })
}

/// Fetch and parse the quote page for `code`.
///
/// # Errors
///
/// Whatever the fetch failed with. An unrecognizable page is not an error;
/// its fields are simply absent.
#[instrument(level = "info", skip_all, fields(%code))]
pub async fn fetch_quote(source: &dyn TextSource, code: &str, timeout: Duration) -> Result<EquityQuote> {
    let fetched = source.fetch_text(&quote_url(code), timeout).await?;
    parse_quote(&fetched.body, code)
}

/// One stocks row for `candidate`; a failed quote becomes a row carrying the error.
pub async fn quote_item(source: &dyn TextSource, candidate: EquityCandidate, timeout: Duration) -> StockItem {
    let (quote, error) = match fetch_quote(source, &candidate.code, timeout).await {
        Ok(quote) => (quote, None),
        Err(e) => {
            warn!(code = %candidate.code, error = %e, "Quote failed; reporting per-item error");
            let empty = EquityQuote {
                price: None,
                change_amount: None,
                change_percent: None,
                direction: None,
                quote_url: quote_url(&candidate.code),
            };
            (empty, Some(e.to_string()))
        }
    };

    StockItem {
        code: candidate.code,
        name: candidate.name,
        quote,
        price_usd: None,
        change_usd: None,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fetch::testing::FakeSource;

    fn page(today: &str, exday: &str, tail: &str) -> String {
        format!(
            r#"<html><body>
<div class="rate_info">
  <p class="no_today">{today}</p>
  <p class="no_exday">{exday}</p>
</div>
<div class="summary">{tail}</div>
</body></html>"#
        )
    }

    const TODAY: &str = r#"<em class="no_up"><span class="blind">71,200</span></em>"#;
    const EXDAY_UP: &str = r#"<em><span class="blind">상승</span><span class="blind">1,300</span></em>
<em><span class="blind">+1.86%</span></em>"#;

    #[test]
    fn test_structural_extraction() {
        let quote = parse_quote(&page(TODAY, EXDAY_UP, ""), "005930").unwrap();
        assert_eq!(quote.price, Some(71_200.0));
        assert_eq!(quote.change_amount, Some(1_300.0));
        assert_eq!(quote.change_percent, Some(1.86));
        assert_eq!(quote.direction, Some(Direction::Up));
        assert_eq!(
            quote.quote_url,
            "https://finance.naver.com/item/main.naver?code=005930"
        );
    }

    #[test]
    fn test_direction_from_percent_sign_without_marker() {
        let exday = r#"<span class="blind">900</span><span class="blind">-1.25%</span>"#;
        let quote = parse_quote(&page(TODAY, exday, ""), "000660").unwrap();
        assert_eq!(quote.direction, Some(Direction::Down));
        assert_eq!(quote.change_percent, Some(1.25));
        assert_eq!(quote.change_amount, Some(900.0));
    }

    #[test]
    fn test_structural_price_beats_text_price() {
        // percent missing structurally, so the text pass runs
        let exday = r#"<span class="blind">하락</span><span class="blind">500</span>"#;
        let tail = "현재가 99,999 전일대비 상승 1,000 2.5 퍼센트";
        let quote = parse_quote(&page(TODAY, exday, tail), "005380").unwrap();
        assert_eq!(quote.price, Some(71_200.0));
        assert_eq!(quote.change_amount, Some(500.0));
        assert_eq!(quote.direction, Some(Direction::Down));
        assert_eq!(quote.change_percent, Some(2.5));
    }

    #[test]
    fn test_text_fallback_when_markup_changed() {
        let html = "<html><body><div>현재가 58,300 전일대비 보합 0 0.00 퍼센트</div></body></html>";
        let quote = parse_quote(html, "035720").unwrap();
        assert_eq!(quote.price, Some(58_300.0));
        assert_eq!(quote.change_amount, Some(0.0));
        assert_eq!(quote.change_percent, Some(0.0));
        assert_eq!(quote.direction, Some(Direction::Flat));
    }

    #[test]
    fn test_unrecognizable_page_leaves_fields_empty() {
        let quote = parse_quote("<html><body>서비스 점검</body></html>", "035420").unwrap();
        assert_eq!(quote.price, None);
        assert_eq!(quote.direction, None);
    }

    #[tokio::test]
    async fn test_failed_fetch_becomes_item_error() {
        let source = FakeSource::new()
            .with_body(quote_url("005930"), page(TODAY, EXDAY_UP, ""))
            .with_error(quote_url("000660"), Error::Network("reset".into()));
        let candidate = |code: &str| EquityCandidate {
            code: code.into(),
            name: "n".into(),
            trading_value: None,
        };

        let ok = quote_item(&source, candidate("005930"), Duration::from_secs(1)).await;
        assert_eq!(ok.error, None);
        assert_eq!(ok.quote.price, Some(71_200.0));

        let failed = quote_item(&source, candidate("000660"), Duration::from_secs(1)).await;
        assert_eq!(failed.quote.price, None);
        assert!(failed.error.as_deref().unwrap().contains("reset"));
        assert_eq!(failed.quote.quote_url, quote_url("000660"));
    }
}
