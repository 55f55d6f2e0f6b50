//! JSON output for the command line and the snapshot directory.
//!
//! # Snapshot layout
//!
//! ```text
//! output_dir/
//! ├── news-all.json
//! ├── news-economy.json
//! ├── ...
//! ├── weather-seoul.json
//! ├── ...
//! ├── stocks.json
//! ├── fx.json
//! └── meta.json
//! ```
//!
//! A resource that failed is written as `{"error": "..."}` so a reader can
//! tell a stale section from a missing one; the other files are unaffected.

use crate::dashboard::Dashboard;
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Serialize `value` as compact or pretty JSON.
pub fn render<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

/// The JSON body for a resource outcome: the value, or `{"error": ...}`.
pub fn render_outcome<T: Serialize>(outcome: &Result<T>, pretty: bool) -> Result<String> {
    match outcome {
        Ok(value) => render(value, pretty),
        Err(e) => render(&json!({ "error": e.to_string() }), pretty),
    }
}

/// How one snapshot pass went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    /// Files written, failed resources included.
    pub written: usize,
    /// Resources that were written as an error object.
    pub failed: usize,
}

impl SnapshotReport {
    fn record<T>(&mut self, outcome: &Result<T>) {
        self.written += 1;
        if outcome.is_err() {
            self.failed += 1;
        }
    }
}

async fn write_file(dir: &Path, name: &str, body: String) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, body)
        .await
        .map_err(|e| Error::Config(format!("cannot write {}: {e}", path.display())))?;
    Ok(path)
}

async fn write_outcome<T: Serialize>(
    dir: &Path,
    name: &str,
    outcome: &Result<T>,
    pretty: bool,
    report: &mut SnapshotReport,
) -> Result<()> {
    if let Err(e) = outcome {
        warn!(file = name, error = %e, "Resource failed; writing error object");
    }
    let path = write_file(dir, name, render_outcome(outcome, pretty)?).await?;
    info!(path = %path.display(), "Wrote snapshot file");
    report.record(outcome);
    Ok(())
}

/// Resolve every resource of `dashboard` and write one JSON file per resource.
///
/// # Arguments
///
/// * `dashboard` - The dashboard whose resources are written
/// * `output_dir` - Existing, writable directory
/// * `pretty` - Pretty-print the JSON files
///
/// # Errors
///
/// Only for local I/O failures. Upstream failures become error objects.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir))]
pub async fn write_snapshot(dashboard: &Dashboard, output_dir: &str, pretty: bool) -> Result<SnapshotReport> {
    let dir = Path::new(output_dir);
    let catalog = dashboard.config().catalog.clone();
    let mut report = SnapshotReport::default();

    for category in &catalog.categories {
        let outcome = dashboard.news(&category.id).await;
        let name = format!("news-{}.json", category.id);
        write_outcome(dir, &name, &outcome, pretty, &mut report).await?;
    }

    for location in &catalog.locations {
        let outcome = dashboard.weather(&location.id).await;
        let name = format!("weather-{}.json", location.id);
        write_outcome(dir, &name, &outcome, pretty, &mut report).await?;
    }

    write_outcome(dir, "stocks.json", &dashboard.stocks().await, pretty, &mut report).await?;
    write_outcome(dir, "fx.json", &dashboard.fx().await, pretty, &mut report).await?;
    write_outcome(dir, "meta.json", &Ok(dashboard.meta()), pretty, &mut report).await?;

    if report.failed > 0 {
        error!(failed = report.failed, written = report.written, "Snapshot written with failed resources");
    } else {
        info!(written = report.written, "Snapshot written");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Catalog, Category, DashboardConfig, Location};
    use crate::fetch::testing::FakeSource;
    use crate::finance::fx::ER_API_URL;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[test]
    fn test_render_outcome_error_object() {
        let failed: Result<u32> = Err(Error::UpstreamExhausted("NAVER: x | ER-API: y".into()));
        assert_eq!(
            render_outcome(&failed, false).unwrap(),
            r#"{"error":"all sources failed | NAVER: x | ER-API: y"}"#
        );
        assert_eq!(render_outcome(&Ok(7u32), false).unwrap(), "7");
        assert!(render(&json!({"a": 1}), true).unwrap().contains('\n'));
    }

    #[tokio::test]
    async fn test_write_snapshot_isolates_failures() {
        let config = DashboardConfig {
            catalog: Catalog {
                categories: vec![Category {
                    id: "all".into(),
                    label: "전체".into(),
                }],
                locations: vec![Location {
                    id: "busan".into(),
                    label: "부산".into(),
                    lat: 35.1796,
                    lon: 129.0756,
                }],
                feeds: BTreeMap::new(),
            },
            ..DashboardConfig::default()
        };
        let source = FakeSource::new().with_body(ER_API_URL, r#"{"rates":{"KRW":1400.0}}"#);
        let dashboard = Dashboard::new(config, Arc::new(source));

        let dir = std::env::temp_dir().join(format!("local_feed_snapshot_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.to_string_lossy().to_string();

        let report = write_snapshot(&dashboard, &path, false).await.unwrap();

        assert_eq!(report.written, 5);
        assert_eq!(report.failed, 1);
        let weather = std::fs::read_to_string(dir.join("weather-busan.json")).unwrap();
        assert!(weather.starts_with(r#"{"error":"HTTP 404"#));
        let fx = std::fs::read_to_string(dir.join("fx.json")).unwrap();
        assert!(fx.contains(r#""rate":1400.0"#));
        let news = std::fs::read_to_string(dir.join("news-all.json")).unwrap();
        assert!(news.contains(r#""feedCount":0"#));
        assert!(dir.join("meta.json").is_file());
        assert!(dir.join("stocks.json").is_file());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
