//! # Local Feed
//!
//! A resilient aggregation and caching layer for a Korean news, markets and
//! weather dashboard. Content comes from many unreliable upstream sources
//! (RSS/Atom feeds in mixed encodings, scraped finance pages, two FX
//! providers, a weather API) and is served as normalized, cached, ranked
//! JSON-ready values.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! 1. [`cache`]: TTL memoization with single-flight misses
//! 2. [`fetch`]: HTTP GET with timeout and charset normalization
//! 3. [`feeds`]: multi-feed news aggregation with per-source failure isolation
//! 4. [`finance`]: equity ranking, quotes and the USD/KRW rate, each with fallbacks
//! 5. [`weather`]: Open-Meteo forecast and air quality
//! 6. [`dashboard`]: the request surface tying resolvers to caches
//!
//! A failing source only ever degrades its own contribution; the only
//! resource-level errors are "no FX tier succeeded" and "no forecast".

pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fallback;
pub mod feeds;
pub mod fetch;
pub mod finance;
pub mod models;
pub mod outputs;
pub mod utils;
pub mod weather;

pub use dashboard::Dashboard;
pub use error::{Error, Result};
