//! RSS/Atom news aggregation.
//!
//! A category is a list of feed URLs. Aggregation runs in three steps:
//!
//! 1. **Parsing** ([`parse`]): shape check, then a tolerant RSS 2.0 / Atom /
//!    RDF reader that keeps whatever fields an entry carries
//! 2. **Extraction** ([`extract`]): one [`NewsItem`](crate::models::NewsItem)
//!    per entry with a parsed date, plain-text excerpt, image and source label
//! 3. **Aggregation** ([`aggregate`]): bounded fan-out over the feeds,
//!    failure isolation, dedup, newest-first ordering and a size cap
//!
//! | Payload | Outcome |
//! |---------|---------|
//! | RSS 2.0 / Atom / RDF | items |
//! | HTML (block page, consent wall) | recorded failure |
//! | timeout, non-2xx, transport error | recorded failure |

pub mod aggregate;
pub mod extract;
pub mod parse;

pub use aggregate::FeedAggregator;
