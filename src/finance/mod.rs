//! Market data scraped from NAVER Finance, with fallbacks.
//!
//! | Resolver | Module | Primary | Fallback |
//! |----------|--------|---------|----------|
//! | Equity ranking | [`ranking`] | four KRX listing pages | built-in large-cap list |
//! | Equity quote | [`quote`] | `.blind` accessibility texts | regexes over page text |
//! | USD/KRW | [`fx`] | market-index page | ER-API JSON |
//!
//! Pages are parsed with `scraper` inside synchronous functions so no parsed
//! document is ever held across an `.await`.

pub mod fx;
pub mod quote;
pub mod ranking;

pub use fx::FxResolver;

use crate::error::{Error, Result};
use scraper::Selector;

/// Compile a CSS selector, reporting a bad one as [`Error::Parse`].
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Parse(format!("invalid selector {css:?}: {e}")))
}
