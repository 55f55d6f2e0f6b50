//! Tunables and the static source catalog.
//!
//! [`DashboardConfig`] bundles [`Settings`] (TTLs, timeouts, caps) with the
//! [`Catalog`] (news categories and their feed URLs, weather locations). Both
//! have built-in defaults; a YAML file may override either section, and
//! anything it omits keeps its default. Feed lists are merged per category.
//!
//! ```yaml
//! settings:
//!   fetch_timeout_ms: 5000
//!   news_ttl_secs: 60
//! catalog:
//!   feeds:
//!     sports:
//!       - https://example.com/sports.xml
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// The category every unknown id falls back to.
pub const DEFAULT_CATEGORY: &str = "all";

const GOOGLE_NEWS_BASE: &str = "https://news.google.com/rss";
const GOOGLE_NEWS_REGION: &str = "hl=ko&gl=KR&ceid=KR:ko";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fetch_timeout_ms: u64,
    pub news_ttl_secs: u64,
    pub weather_ttl_secs: u64,
    pub fx_ttl_secs: u64,
    pub ranking_ttl_secs: u64,
    pub stocks_ttl_secs: u64,
    /// Cap on items in one news aggregate.
    pub max_news_items: usize,
    /// Cap on failure descriptions kept in a news aggregate.
    pub sample_failures: usize,
    /// Upper bound on simultaneous upstream requests within one aggregation pass.
    pub fetch_concurrency: usize,
    /// How many ranked equities the stocks response quotes.
    pub top_equities: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 9_000,
            news_ttl_secs: 2 * 60,
            weather_ttl_secs: 3 * 60,
            fx_ttl_secs: 10 * 60,
            ranking_ttl_secs: 5 * 60,
            stocks_ttl_secs: 2 * 60,
            max_news_items: 60,
            sample_failures: 5,
            fetch_concurrency: 4,
            top_equities: 6,
        }
    }
}

impl Settings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn news_ttl(&self) -> Duration {
        Duration::from_secs(self.news_ttl_secs)
    }

    pub fn weather_ttl(&self) -> Duration {
        Duration::from_secs(self.weather_ttl_secs)
    }

    pub fn fx_ttl(&self) -> Duration {
        Duration::from_secs(self.fx_ttl_secs)
    }

    pub fn ranking_ttl(&self) -> Duration {
        Duration::from_secs(self.ranking_ttl_secs)
    }

    pub fn stocks_ttl(&self) -> Duration {
        Duration::from_secs(self.stocks_ttl_secs)
    }

    /// Concurrency is at least one.
    pub fn concurrency(&self) -> usize {
        self.fetch_concurrency.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub label: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub categories: Vec<Category>,
    pub locations: Vec<Location>,
    /// Feed URLs per category id. Configured lists replace the built-in list
    /// of their own category only.
    #[serde(deserialize_with = "feeds_over_defaults")]
    pub feeds: BTreeMap<String, Vec<String>>,
}

fn feeds_over_defaults<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, Vec<String>>::deserialize(deserializer)?;
    let mut feeds = default_feeds();
    feeds.extend(overrides);
    Ok(feeds)
}

impl Catalog {
    /// Category by id, falling back to [`DEFAULT_CATEGORY`] and then to the first entry.
    pub fn category(&self, id: &str) -> Category {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .or_else(|| self.categories.iter().find(|c| c.id == DEFAULT_CATEGORY))
            .or_else(|| self.categories.first())
            .cloned()
            .unwrap_or_else(|| Category {
                id: DEFAULT_CATEGORY.to_string(),
                label: "전체".to_string(),
            })
    }

    /// Feed URLs of a category; categories without their own list use the default list.
    pub fn feeds_for(&self, category_id: &str) -> &[String] {
        self.feeds
            .get(category_id)
            .or_else(|| self.feeds.get(DEFAULT_CATEGORY))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Location by id, falling back to the first configured location.
    pub fn location(&self, id: &str) -> Option<&Location> {
        self.locations
            .iter()
            .find(|l| l.id == id)
            .or_else(|| self.locations.first())
    }
}

fn google_topic(topic: &str) -> String {
    format!("{GOOGLE_NEWS_BASE}/headlines/section/topic/{topic}?{GOOGLE_NEWS_REGION}")
}

fn google_search(query: &str) -> String {
    format!(
        "{GOOGLE_NEWS_BASE}/search?q={}&{GOOGLE_NEWS_REGION}",
        urlencoding::encode(query)
    )
}

fn category(id: &str, label: &str) -> Category {
    Category {
        id: id.to_string(),
        label: label.to_string(),
    }
}

fn location(id: &str, label: &str, lat: f64, lon: f64) -> Location {
    Location {
        id: id.to_string(),
        label: label.to_string(),
        lat,
        lon,
    }
}

fn default_feeds() -> BTreeMap<String, Vec<String>> {
    let mut feeds = BTreeMap::new();
    feeds.insert(
        "all".to_string(),
        vec![
            format!("{GOOGLE_NEWS_BASE}?{GOOGLE_NEWS_REGION}"),
            "https://www.mk.co.kr/rss/40300001/".to_string(),
            "https://www.khan.co.kr/rss/rssdata/total_news.xml".to_string(),
            "http://www.hani.co.kr/rss/".to_string(),
            "http://rss.donga.com/total.xml".to_string(),
            "http://rss.joins.com/joins_news_list.xml".to_string(),
        ],
    );
    feeds.insert(
        "politics".to_string(),
        vec![
            google_search("정치"),
            "https://www.mk.co.kr/rss/30200030/".to_string(),
            "https://www.khan.co.kr/rss/rssdata/politic_news.xml".to_string(),
            "http://www.hani.co.kr/rss/politics/".to_string(),
            "http://rss.donga.com/politics.xml".to_string(),
            "http://rss.joins.com/joins_politics_list.xml".to_string(),
        ],
    );
    feeds.insert(
        "economy".to_string(),
        vec![
            google_topic("BUSINESS"),
            "https://www.mk.co.kr/rss/30100041/".to_string(),
            "https://www.khan.co.kr/rss/rssdata/economy_news.xml".to_string(),
            "http://www.hani.co.kr/rss/economy/".to_string(),
            "http://rss.donga.com/economy.xml".to_string(),
            "http://rss.joins.com/joins_money_list.xml".to_string(),
        ],
    );
    feeds.insert(
        "society".to_string(),
        vec![
            google_search("사회"),
            "https://www.mk.co.kr/rss/50400012/".to_string(),
            "https://www.khan.co.kr/rss/rssdata/society_news.xml".to_string(),
            "http://www.hani.co.kr/rss/society/".to_string(),
            "http://rss.donga.com/national.xml".to_string(),
            "http://rss.joins.com/joins_life_list.xml".to_string(),
        ],
    );
    feeds.insert(
        "culture".to_string(),
        vec![
            google_search("생활 문화"),
            "https://www.khan.co.kr/rss/rssdata/culture_news.xml".to_string(),
            "http://www.hani.co.kr/rss/culture/".to_string(),
            "http://rss.donga.com/culture.xml".to_string(),
            "http://rss.joins.com/joins_culture_list.xml".to_string(),
        ],
    );
    feeds.insert(
        "sports".to_string(),
        vec![
            google_topic("SPORTS"),
            "http://www.hani.co.kr/rss/sports/".to_string(),
            "http://rss.donga.com/sportsdonga/sports_total.xml".to_string(),
        ],
    );
    feeds.insert(
        "it".to_string(),
        vec![
            google_topic("TECHNOLOGY"),
            google_topic("SCIENCE"),
            "https://www.khan.co.kr/rss/rssdata/science_news.xml".to_string(),
            "http://www.hani.co.kr/rss/science/".to_string(),
            "http://rss.joins.com/joins_it_list.xml".to_string(),
            "http://rss.etnews.co.kr/Section901.xml".to_string(),
        ],
    );
    feeds.insert(
        "world".to_string(),
        vec![
            google_topic("WORLD"),
            "https://www.khan.co.kr/rss/rssdata/kh_world.xml".to_string(),
            "http://www.hani.co.kr/rss/international/".to_string(),
            "http://rss.donga.com/international.xml".to_string(),
            "http://rss.joins.com/joins_world_list.xml".to_string(),
        ],
    );
    feeds
}

impl Default for Catalog {
    fn default() -> Self {
        let categories = vec![
            category("all", "전체"),
            category("politics", "정치"),
            category("economy", "경제"),
            category("society", "사회"),
            category("culture", "생활/문화"),
            category("sports", "스포츠"),
            category("it", "IT/과학"),
            category("world", "세계"),
        ];

        let locations = vec![
            location("seoul", "서울", 37.5665, 126.9780),
            location("busan", "부산", 35.1796, 129.0756),
            location("daegu", "대구", 35.8714, 128.6014),
            location("incheon", "인천", 37.4563, 126.7052),
            location("gwangju", "광주", 35.1595, 126.8526),
            location("daejeon", "대전", 36.3504, 127.3845),
            location("ulsan", "울산", 35.5384, 129.3114),
            location("sejong", "세종", 36.4800, 127.2890),
            location("suwon", "수원", 37.2636, 127.0286),
            location("chuncheon", "춘천", 37.8813, 127.7298),
            location("cheongju", "청주", 36.6424, 127.4890),
            location("jeonju", "전주", 35.8242, 127.1480),
            location("changwon", "창원", 35.2270, 128.6811),
            location("jeju", "제주", 33.4996, 126.5312),
        ];

        Self {
            categories,
            locations,
            feeds: default_feeds(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub settings: Settings,
    pub catalog: Catalog,
}

impl DashboardConfig {
    /// Parse a YAML document; omitted sections and fields keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }

    /// Load a YAML config file.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the file cannot be read or does not parse.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_yaml_str(&yaml)?;
        info!(
            categories = config.catalog.categories.len(),
            locations = config.catalog.locations.len(),
            "Loaded configuration"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls() {
        let s = Settings::default();
        assert_eq!(s.news_ttl(), Duration::from_secs(120));
        assert_eq!(s.weather_ttl(), Duration::from_secs(180));
        assert_eq!(s.fx_ttl(), Duration::from_secs(600));
        assert_eq!(s.ranking_ttl(), Duration::from_secs(300));
        assert_eq!(s.stocks_ttl(), Duration::from_secs(120));
        assert_eq!(s.max_news_items, 60);
    }

    #[test]
    fn test_unknown_category_falls_back_to_all() {
        let catalog = Catalog::default();
        assert_eq!(catalog.category("sports").label, "스포츠");
        assert_eq!(catalog.category("nope").id, "all");
        assert_eq!(catalog.feeds_for("nope"), catalog.feeds_for("all"));
        assert_eq!(catalog.feeds_for("sports").len(), 3);
    }

    #[test]
    fn test_unknown_location_falls_back_to_first() {
        let catalog = Catalog::default();
        assert_eq!(catalog.location("jeju").unwrap().label, "제주");
        assert_eq!(catalog.location("atlantis").unwrap().id, "seoul");
    }

    #[test]
    fn test_google_search_query_is_encoded() {
        let url = google_search("생활 문화");
        assert!(url.starts_with("https://news.google.com/rss/search?q=%EC%83%9D"));
        assert!(url.contains("%20"));
        assert!(url.ends_with("&hl=ko&gl=KR&ceid=KR:ko"));
    }

    #[test]
    fn test_yaml_overrides_keep_defaults() {
        let config = DashboardConfig::from_yaml_str(
            "settings:\n  news_ttl_secs: 30\ncatalog:\n  feeds:\n    all:\n      - https://example.com/a.xml\n",
        )
        .unwrap();
        assert_eq!(config.settings.news_ttl_secs, 30);
        assert_eq!(config.settings.fx_ttl_secs, 600);
        assert_eq!(config.catalog.feeds_for("all"), ["https://example.com/a.xml"]);
        assert_eq!(config.catalog.feeds_for("unknown"), ["https://example.com/a.xml"]);
        assert_eq!(config.catalog.categories.len(), 8);
    }

    #[test]
    fn test_yaml_feed_override_keeps_other_categories() {
        let defaults = Catalog::default();
        let config = DashboardConfig::from_yaml_str(
            "catalog:\n  feeds:\n    sports:\n      - https://example.com/sports.xml\n",
        )
        .unwrap();
        assert_eq!(config.catalog.feeds_for("sports"), ["https://example.com/sports.xml"]);
        assert_eq!(config.catalog.feeds_for("economy"), defaults.feeds_for("economy"));
        assert_eq!(config.catalog.feeds_for("all"), defaults.feeds_for("all"));
        assert_eq!(config.catalog.feeds.len(), defaults.feeds.len());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = DashboardConfig::from_yaml_str("settings: [1, 2").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
