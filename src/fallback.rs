//! Ordered "try, else try next" chains.
//!
//! A [`Tiers`] holds named, independently fallible attempts at the same
//! logical value. [`Tiers::resolve`] runs them left to right and stops at the
//! first success. Attempts are lazy futures, so later tiers cost nothing
//! unless an earlier one fails.

use crate::error::{Error, Result};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use tracing::warn;

/// The value produced by the first tier that succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub tier: &'static str,
}

/// An ordered list of named attempts.
pub struct Tiers<'a, T> {
    attempts: Vec<(&'static str, BoxFuture<'a, Result<T>>)>,
}

impl<'a, T> Default for Tiers<'a, T> {
    fn default() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }
}

impl<'a, T: Send + 'a> Tiers<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tier. It only runs if every tier before it failed.
    pub fn or_try<F>(mut self, name: &'static str, attempt: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'a,
    {
        self.attempts.push((name, attempt.boxed()));
        self
    }

    /// Run the tiers in order.
    ///
    /// # Errors
    ///
    /// [`Error::UpstreamExhausted`] naming every tier and why it failed.
    pub async fn resolve(self) -> Result<Resolved<T>> {
        let mut failures = Vec::with_capacity(self.attempts.len());
        for (tier, attempt) in self.attempts {
            match attempt.await {
                Ok(value) => return Ok(Resolved { value, tier }),
                Err(e) => {
                    warn!(tier, error = %e, "Tier failed; trying next");
                    failures.push(format!("{tier}: {e}"));
                }
            }
        }
        if failures.is_empty() {
            return Err(Error::UpstreamExhausted("no tiers configured".into()));
        }
        Err(Error::UpstreamExhausted(failures.join(" | ")))
    }
}
