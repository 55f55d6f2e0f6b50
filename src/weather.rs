//! Current conditions, 5-day outlook and air quality from Open-Meteo.
//!
//! The forecast call is required; the air-quality call is best-effort and its
//! failure only leaves `pm10`, `pm2_5` and `aqAsOf` empty.

use crate::config::Location;
use crate::error::{Error, Result};
use crate::fetch::TextSource;
use crate::models::{CurrentConditions, DailyOutlook, LocationRef, WeatherSnapshot};
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};
use url::Url;

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const AIR_QUALITY_URL: &str = "https://air-quality-api.open-meteo.com/v1/air-quality";
const TIMEZONE: &str = "Asia/Seoul";
const CURRENT_FIELDS: &str = "temperature_2m,apparent_temperature,weather_code,wind_speed_10m,relative_humidity_2m,precipitation";
const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,weather_code";
const OUTLOOK_DAYS: usize = 5;
/// Layout of Open-Meteo local times.
const TIME_LAYOUT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ForecastResponse {
    current: ForecastCurrent,
    hourly: ForecastHourly,
    daily: ForecastDaily,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ForecastCurrent {
    time: Option<String>,
    temperature_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    weather_code: Option<i64>,
    wind_speed_10m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    precipitation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ForecastHourly {
    time: Vec<String>,
    precipitation_probability: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ForecastDaily {
    time: Vec<String>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    weather_code: Vec<Option<i64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AirQualityResponse {
    current: AirQualityCurrent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AirQualityCurrent {
    time: Option<String>,
    pm10: Option<f64>,
    pm2_5: Option<f64>,
}

/// Korean description of a WMO weather code.
pub fn weather_code_to_text(code: Option<i64>) -> String {
    let Some(code) = code else {
        return "정보 없음".to_string();
    };
    let text = match code {
        0 => "맑음",
        1 => "대체로 맑음",
        2 => "부분적으로 흐림",
        3 => "흐림",
        45 => "안개",
        48 => "서리 안개",
        51 => "약한 이슬비",
        53 => "이슬비",
        55 => "강한 이슬비",
        61 => "약한 비",
        63 => "비",
        65 => "강한 비",
        71 => "약한 눈",
        73 => "눈",
        75 => "강한 눈",
        80 => "약한 소나기",
        81 => "소나기",
        82 => "강한 소나기",
        95 => "뇌우",
        96 => "뇌우(우박 가능)",
        99 => "강한 뇌우(우박 가능)",
        other => return format!("코드 {other}"),
    };
    text.to_string()
}

/// Index of the slot in `times` closest to `target`; `0` when nothing parses.
pub fn nearest_index_by_time(times: &[String], target: Option<&str>) -> usize {
    let Some(target) = target.and_then(|t| NaiveDateTime::parse_from_str(t, TIME_LAYOUT).ok()) else {
        return 0;
    };
    times
        .iter()
        .enumerate()
        .filter_map(|(i, t)| {
            NaiveDateTime::parse_from_str(t, TIME_LAYOUT)
                .ok()
                .map(|slot| (i, (slot - target).num_seconds().abs()))
        })
        .min_by_key(|&(_, diff)| diff)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn with_params(base: &str, params: &[(&str, String)]) -> Result<String> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| Error::Config(format!("invalid URL {base}: {e}")))
}

pub fn forecast_url(loc: &Location) -> Result<String> {
    with_params(
        FORECAST_URL,
        &[
            ("latitude", loc.lat.to_string()),
            ("longitude", loc.lon.to_string()),
            ("current", CURRENT_FIELDS.to_string()),
            ("hourly", "precipitation_probability".to_string()),
            ("daily", DAILY_FIELDS.to_string()),
            ("wind_speed_unit", "ms".to_string()),
            ("timezone", TIMEZONE.to_string()),
        ],
    )
}

pub fn air_quality_url(loc: &Location) -> Result<String> {
    with_params(
        AIR_QUALITY_URL,
        &[
            ("latitude", loc.lat.to_string()),
            ("longitude", loc.lon.to_string()),
            ("current", "pm10,pm2_5".to_string()),
            ("timezone", TIMEZONE.to_string()),
        ],
    )
}

/// Resolves [`WeatherSnapshot`]s for catalog locations.
#[derive(Clone)]
pub struct WeatherResolver {
    source: Arc<dyn TextSource>,
    timeout: Duration,
}

impl WeatherResolver {
    pub fn new(source: Arc<dyn TextSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    async fn air_quality(&self, loc: &Location) -> Result<AirQualityCurrent> {
        let url = air_quality_url(loc)?;
        let fetched = self.source.fetch_text(&url, self.timeout).await?;
        let response: AirQualityResponse = serde_json::from_str(&fetched.body)?;
        Ok(response.current)
    }

    /// Forecast plus best-effort air quality for `loc`.
    ///
    /// # Errors
    ///
    /// Only when the forecast itself cannot be fetched or decoded.
    #[instrument(level = "info", skip_all, fields(location = %loc.id))]
    pub async fn snapshot(&self, loc: &Location) -> Result<WeatherSnapshot> {
        let url = forecast_url(loc)?;
        let fetched = self.source.fetch_text(&url, self.timeout).await?;
        let forecast: ForecastResponse = serde_json::from_str(&fetched.body)?;

        let air = match self.air_quality(loc).await {
            Ok(air) => air,
            Err(e) => {
                warn!(error = %e, "Air quality unavailable; continuing without it");
                AirQualityCurrent::default()
            }
        };

        let ForecastResponse {
            current,
            hourly,
            daily,
        } = forecast;

        let slot = nearest_index_by_time(&hourly.time, current.time.as_deref());
        let precip_prob_pct = hourly
            .precipitation_probability
            .get(slot)
            .copied()
            .flatten();

        let outlook = daily
            .time
            .iter()
            .take(OUTLOOK_DAYS)
            .enumerate()
            .map(|(i, date)| {
                let code = daily.weather_code.get(i).copied().flatten();
                DailyOutlook {
                    date: date.clone(),
                    tmax: daily.temperature_2m_max.get(i).copied().flatten(),
                    tmin: daily.temperature_2m_min.get(i).copied().flatten(),
                    code,
                    text: weather_code_to_text(code),
                }
            })
            .collect();

        Ok(WeatherSnapshot {
            loc: LocationRef::from(loc),
            as_of: current
                .time
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339()),
            current: CurrentConditions {
                temp_c: current.temperature_2m,
                feels_c: current.apparent_temperature,
                wind_ms: current.wind_speed_10m,
                humidity_pct: current.relative_humidity_2m,
                precip_mm: current.precipitation,
                precip_prob_pct,
                code: current.weather_code,
                text: weather_code_to_text(current.weather_code),
                pm10: air.pm10,
                pm2_5: air.pm2_5,
                aq_as_of: air.time,
            },
            daily: outlook,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeSource;

    fn seoul() -> Location {
        Location {
            id: "seoul".into(),
            label: "서울".into(),
            lat: 37.5665,
            lon: 126.978,
        }
    }

    const FORECAST: &str = r#"{
  "current": {"time": "2025-10-14T10:15", "temperature_2m": 18.4, "apparent_temperature": 17.9,
              "weather_code": 61, "wind_speed_10m": 2.3, "relative_humidity_2m": 71, "precipitation": 0.4},
  "hourly": {"time": ["2025-10-14T09:00", "2025-10-14T10:00", "2025-10-14T11:00"],
             "precipitation_probability": [20, 55, 80]},
  "daily": {"time": ["2025-10-14","2025-10-15","2025-10-16","2025-10-17","2025-10-18","2025-10-19","2025-10-20"],
            "temperature_2m_max": [21.0, 22.5, 19.0, 18.0, 20.0, 23.0, 24.0],
            "temperature_2m_min": [12.0, 13.5, 11.0, 10.0, 12.0, 14.0, 15.0],
            "weather_code": [61, 3, 0, 1, 2, 45, 95]}
}"#;

    fn resolver(source: FakeSource) -> WeatherResolver {
        WeatherResolver::new(Arc::new(source), Duration::from_secs(1))
    }

    #[test]
    fn test_weather_code_text() {
        assert_eq!(weather_code_to_text(Some(61)), "약한 비");
        assert_eq!(weather_code_to_text(Some(99)), "강한 뇌우(우박 가능)");
        assert_eq!(weather_code_to_text(Some(7)), "코드 7");
        assert_eq!(weather_code_to_text(None), "정보 없음");
    }

    #[test]
    fn test_nearest_index_by_time() {
        let times: Vec<String> = ["2025-10-14T09:00", "garbage", "2025-10-14T11:00"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(nearest_index_by_time(&times, Some("2025-10-14T10:45")), 2);
        assert_eq!(nearest_index_by_time(&times, Some("2025-10-14T09:10")), 0);
        assert_eq!(nearest_index_by_time(&times, Some("not a time")), 0);
        assert_eq!(nearest_index_by_time(&[], Some("2025-10-14T09:10")), 0);
    }

    #[test]
    fn test_forecast_url_requests_metric_wind() {
        let url = forecast_url(&seoul()).unwrap();
        assert!(url.starts_with("https://api.open-meteo.com/v1/forecast?latitude=37.5665&longitude=126.978"));
        assert!(url.contains("wind_speed_unit=ms"));
        assert!(url.contains("timezone=Asia%2FSeoul"));
    }

    #[tokio::test]
    async fn test_snapshot_without_air_quality() {
        let loc = seoul();
        let source = FakeSource::new().with_body(forecast_url(&loc).unwrap(), FORECAST);

        let snapshot = resolver(source).snapshot(&loc).await.unwrap();

        assert_eq!(snapshot.loc.id, "seoul");
        assert_eq!(snapshot.as_of, "2025-10-14T10:15");
        assert_eq!(snapshot.current.temp_c, Some(18.4));
        assert_eq!(snapshot.current.humidity_pct, Some(71.0));
        assert_eq!(snapshot.current.precip_prob_pct, Some(55.0));
        assert_eq!(snapshot.current.text, "약한 비");
        assert_eq!(snapshot.current.pm10, None);
        assert_eq!(snapshot.current.aq_as_of, None);
        assert_eq!(snapshot.daily.len(), 5);
        assert_eq!(snapshot.daily[2].text, "맑음");
        assert_eq!(snapshot.daily[1].tmin, Some(13.5));
    }

    #[tokio::test]
    async fn test_snapshot_with_air_quality() {
        let loc = seoul();
        let source = FakeSource::new()
            .with_body(forecast_url(&loc).unwrap(), FORECAST)
            .with_body(
                air_quality_url(&loc).unwrap(),
                r#"{"current": {"time": "2025-10-14T10:00", "pm10": 31.2, "pm2_5": 14.8}}"#,
            );

        let snapshot = resolver(source).snapshot(&loc).await.unwrap();
        assert_eq!(snapshot.current.pm10, Some(31.2));
        assert_eq!(snapshot.current.pm2_5, Some(14.8));
        assert_eq!(snapshot.current.aq_as_of.as_deref(), Some("2025-10-14T10:00"));
    }

    #[tokio::test]
    async fn test_forecast_failure_fails_the_snapshot() {
        let loc = seoul();
        let source = FakeSource::new().with_body(forecast_url(&loc).unwrap(), "<html>502</html>");
        let err = resolver(source).snapshot(&loc).await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
