//! Top equities by trading value, scraped from the KRX listing pages.
//!
//! Four listing pages are tried in order: trading-value rankings for KOSPI and
//! KOSDAQ, then the trading-volume rankings for both markets (those tables also
//! carry a 거래대금 column). Each page is parsed independently; a page that
//! fails to fetch or yields no usable row is logged and skipped.
//!
//! The best trading value seen for a code across all pages wins. When no page
//! produced anything the built-in [`FALLBACK`] list is returned, so ranking
//! always has an answer.

use super::selector;
use crate::error::{Error, Result};
use crate::fetch::TextSource;
use crate::models::EquityCandidate;
use crate::utils::parse_krw_number;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Listing pages in the order they are attempted.
pub const LISTING_URLS: [&str; 4] = [
    "https://finance.naver.com/sise/sise_amount.naver?sosok=0&page=1",
    "https://finance.naver.com/sise/sise_amount.naver?sosok=1&page=1",
    "https://finance.naver.com/sise/sise_quant.naver?sosok=0&page=1",
    "https://finance.naver.com/sise/sise_quant.naver?sosok=1&page=1",
];

/// Well-known large caps served when no listing page could be parsed.
pub const FALLBACK: [(&str, &str); 6] = [
    ("005930", "삼성전자"),
    ("000660", "SK하이닉스"),
    ("373220", "LG에너지솔루션"),
    ("005380", "현대차"),
    ("035420", "NAVER"),
    ("035720", "카카오"),
];

const TRADING_VALUE_HEADER: &str = "거래대금";
/// Column used when the header row does not name the trading-value column.
const TRADING_VALUE_COLUMN: usize = 6;

static CODE_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"code=(\d{6})").expect("valid regex"));

/// Rows of the first `table.type_2` that carry a six-digit code, a name and a
/// numeric trading value.
///
/// # Errors
///
/// * [`Error::Shape`] if the page has no listing table (block page, redesign).
/// * [`Error::Parse`] if the table has no usable row.
pub fn parse_listing(html: &str) -> Result<Vec<EquityCandidate>> {
    let document = Html::parse_document(html);
    let table_sel = selector("table.type_2")?;
    let header_row_sel = selector("thead tr")?;
    let th_sel = selector("th")?;
    let row_sel = selector("tbody tr")?;
    let anchor_sel = selector(r#"a[href*="code="]"#)?;
    let td_sel = selector("td")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| Error::Shape("type_2 table not found".into()))?;

    let value_column = table
        .select(&header_row_sel)
        .last()
        .and_then(|row| {
            row.select(&th_sel)
                .position(|th| element_text(th).contains(TRADING_VALUE_HEADER))
        })
        .unwrap_or(TRADING_VALUE_COLUMN);

    let candidates: Vec<EquityCandidate> = table
        .select(&row_sel)
        .filter_map(|row| {
            let anchor = row.select(&anchor_sel).next()?;
            let href = anchor.value().attr("href")?;
            let code = CODE_PARAM.captures(href)?.get(1)?.as_str().to_string();
            let name = element_text(anchor);
            if name.is_empty() {
                return None;
            }
            let cell = row.select(&td_sel).nth(value_column)?;
            let trading_value = parse_krw_number(&element_text(cell))?;
            Some(EquityCandidate {
                code,
                name,
                trading_value: Some(trading_value),
            })
        })
        .collect();

    if candidates.is_empty() {
        return Err(Error::Parse(
            "no parsable rows (maybe blocked/empty)".into(),
        ));
    }
    Ok(candidates)
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Keep the highest trading value per code, then order by it, highest first.
pub fn merge_candidates(pages: Vec<Vec<EquityCandidate>>, limit: usize) -> Vec<EquityCandidate> {
    let mut best: HashMap<String, EquityCandidate> = HashMap::new();
    for candidate in pages.into_iter().flatten() {
        let replace = match best.get(&candidate.code) {
            Some(current) => candidate.trading_value > current.trading_value,
            None => true,
        };
        if replace {
            best.insert(candidate.code.clone(), candidate);
        }
    }

    best.into_values()
        .sorted_by(|a, b| {
            b.trading_value
                .partial_cmp(&a.trading_value)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.code.cmp(&b.code))
        })
        .take(limit)
        .collect()
}

/// The static list, truncated to `limit`.
pub fn fallback_candidates(limit: usize) -> Vec<EquityCandidate> {
    FALLBACK
        .iter()
        .take(limit)
        .map(|(code, name)| EquityCandidate {
            code: code.to_string(),
            name: name.to_string(),
            trading_value: None,
        })
        .collect()
}

/// Up to `limit` equities ranked by trading value. Never fails.
///
/// # Arguments
///
/// * `source` - where listing pages are fetched from
/// * `timeout` - per-page deadline
/// * `limit` - maximum number of candidates returned
#[instrument(level = "info", skip(source))]
pub async fn top_traded_equities(
    source: &dyn TextSource,
    timeout: Duration,
    limit: usize,
) -> Vec<EquityCandidate> {
    let pages: Vec<Vec<EquityCandidate>> = stream::iter(LISTING_URLS)
        .then(|url| async move {
            let outcome = match source.fetch_text(url, timeout).await {
                Ok(fetched) => parse_listing(&fetched.body),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(rows) => {
                    debug!(%url, rows = rows.len(), "Parsed listing page");
                    Some(rows)
                }
                Err(e) => {
                    warn!(%url, error = %e, "Listing page failed; skipping");
                    None
                }
            }
        })
        .filter_map(std::future::ready)
        .collect()
        .await;

    let parsed_pages = pages.len();
    let ranked = merge_candidates(pages, limit);
    if ranked.is_empty() {
        warn!("No listing page parsed; serving the built-in equity list");
        return fallback_candidates(limit);
    }

    info!(parsed_pages, count = ranked.len(), "Ranked equities by trading value");
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeSource;

    fn listing(header: &[&str], rows: &[(&str, &str, &str)], value_column: usize) -> String {
        let ths: String = header.iter().map(|h| format!("<th>{h}</th>")).collect();
        let trs: String = rows
            .iter()
            .map(|(code, name, value)| {
                let mut tds = vec!["<td>1</td>".to_string()];
                tds.push(format!(
                    r#"<td><a href="/item/main.naver?code={code}" class="tltle">{name}</a></td>"#
                ));
                while tds.len() < value_column {
                    tds.push("<td>0</td>".to_string());
                }
                tds.push(format!(r#"<td class="number">{value}</td>"#));
                format!("<tr>{}</tr>", tds.concat())
            })
            .collect();
        format!(
            r#"<html><body><table class="type_2"><thead><tr>{ths}</tr></thead><tbody>
<tr><td colspan="12" class="blank_08"></td></tr>{trs}</tbody></table></body></html>"#
        )
    }

    const HEADER: [&str; 8] = ["N", "종목명", "현재가", "전일비", "등락률", "거래량", "거래대금", "시가총액"];

    #[test]
    fn test_parse_listing_uses_header_column() {
        let html = listing(&HEADER, &[("005930", "삼성전자", "2,345,678"), ("000660", "SK하이닉스", "1,000")], 6);
        let rows = parse_listing(&html).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, "005930");
        assert_eq!(rows[0].name, "삼성전자");
        assert_eq!(rows[0].trading_value, Some(2_345_678.0));
    }

    #[test]
    fn test_parse_listing_finds_moved_column_by_header() {
        let header = ["N", "종목명", "거래대금", "현재가"];
        let html = listing(&header, &[("035420", "NAVER", "9,999")], 2);
        let rows = parse_listing(&html).unwrap();
        assert_eq!(rows[0].trading_value, Some(9_999.0));
    }

    #[test]
    fn test_parse_listing_falls_back_to_fixed_column() {
        let header = ["N", "종목명", "a", "b", "c", "d", "e"];
        let html = listing(&header, &[("035720", "카카오", "777")], 6);
        assert_eq!(parse_listing(&html).unwrap()[0].trading_value, Some(777.0));
    }

    #[test]
    fn test_parse_listing_rejects_pages_without_rows() {
        let err = parse_listing("<html><body>점검 중</body></html>").unwrap_err();
        assert!(matches!(err, Error::Shape(_)));

        let empty = listing(&HEADER, &[], 6);
        assert!(matches!(parse_listing(&empty).unwrap_err(), Error::Parse(_)));

        let unparsable = listing(&HEADER, &[("005930", "삼성전자", "-")], 6);
        assert!(parse_listing(&unparsable).is_err());
    }

    #[test]
    fn test_merge_keeps_best_value_per_code() {
        let candidate = |code: &str, value: f64| EquityCandidate {
            code: code.into(),
            name: format!("n{code}"),
            trading_value: Some(value),
        };
        let merged = merge_candidates(
            vec![
                vec![candidate("000001", 10.0), candidate("000002", 50.0)],
                vec![candidate("000001", 90.0), candidate("000003", 20.0)],
            ],
            2,
        );
        let codes: Vec<&str> = merged.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, ["000001", "000002"]);
        assert_eq!(merged[0].trading_value, Some(90.0));
    }

    #[tokio::test]
    async fn test_all_pages_failing_serves_fallback() {
        let source = FakeSource::new().with_body(LISTING_URLS[0], "<html>blocked</html>");
        let ranked = top_traded_equities(&source, Duration::from_secs(1), 4).await;
        assert_eq!(ranked, fallback_candidates(4));
        assert_eq!(ranked.len(), 4);
        assert_eq!(ranked[0].name, "삼성전자");
        assert_eq!(source.calls().len(), LISTING_URLS.len());

        let more_than_known = top_traded_equities(&source, Duration::from_secs(1), 10).await;
        assert_eq!(more_than_known.len(), FALLBACK.len());
    }

    #[tokio::test]
    async fn test_one_good_page_is_enough() {
        let source = FakeSource::new().with_body(
            LISTING_URLS[2],
            listing(&HEADER, &[("005930", "삼성전자", "300"), ("000660", "SK하이닉스", "500")], 6),
        );
        let ranked = top_traded_equities(&source, Duration::from_secs(1), 6).await;
        let codes: Vec<&str> = ranked.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, ["000660", "005930"]);
    }
}
