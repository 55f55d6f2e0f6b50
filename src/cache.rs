//! Time-bounded memoization with request coalescing.
//!
//! A [`TtlCache`] maps string keys (e.g. `"news:economy"`) to values that stay
//! live until their expiry instant. A miss starts exactly one computation;
//! callers that arrive while it is in flight await the same shared future
//! instead of hitting the upstream again.
//!
//! # Failure semantics
//!
//! A failed computation is handed to every coalesced waiter and then dropped
//! from the map, so the next call retries immediately. Nothing is cached for
//! a failure. A producer that panics counts as a failure.
//!
//! # Clock
//!
//! Expiry uses [`tokio::time::Instant`], so tests can drive it with
//! `tokio::time::pause()` and `advance()`.

use crate::error::{Error, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

type InFlight<T> = Shared<BoxFuture<'static, Result<T>>>;

enum Slot<T> {
    Ready { value: T, expire_at: Instant },
    Pending { generation: u64, future: InFlight<T> },
}

impl<T> Slot<T> {
    fn is_expired(&self, now: Instant) -> bool {
        match self {
            Slot::Ready { expire_at, .. } => now >= *expire_at,
            Slot::Pending { .. } => false,
        }
    }
}

/// Generic key→value memoization with per-entry expiry and single-flight misses.
pub struct TtlCache<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
    generation: AtomicU64,
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }
}

impl<T> TtlCache<T> {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> std::fmt::Debug for TtlCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.lock().len())
            .finish()
    }
}

impl<T> TtlCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live value for `key`, or run `producer` and store its result for `ttl`.
    ///
    /// `producer` is only invoked on a miss, and only by the first caller of a
    /// miss; it should return a lazy future (an `async move` block) that owns
    /// everything it needs.
    ///
    /// # Errors
    ///
    /// Whatever the producer failed with. The failure is not cached.
    #[instrument(level = "debug", skip_all, fields(%key))]
    pub async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (generation, future) = {
            let mut slots = self.lock();
            let now = Instant::now();
            let in_flight = match slots.get(key) {
                Some(Slot::Ready { value, expire_at }) if now < *expire_at => {
                    debug!("cache hit");
                    return Ok(value.clone());
                }
                Some(Slot::Pending { generation, future }) => Some((*generation, future.clone())),
                _ => None,
            };
            match in_flight {
                Some(joined) => {
                    debug!("joining in-flight computation");
                    joined
                }
                None => {
                    debug!("cache miss");
                    slots.retain(|_, slot| !slot.is_expired(now));
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let future = AssertUnwindSafe(producer())
                        .catch_unwind()
                        .map(|outcome| {
                            outcome.unwrap_or_else(|_| {
                                Err(Error::Parse("cache producer panicked".into()))
                            })
                        })
                        .boxed()
                        .shared();
                    slots.insert(
                        key.to_string(),
                        Slot::Pending {
                            generation,
                            future: future.clone(),
                        },
                    );
                    (generation, future)
                }
            }
        };

        let result = future.await;

        let mut slots = self.lock();
        let owns_slot = matches!(
            slots.get(key),
            Some(Slot::Pending { generation: g, .. }) if *g == generation
        );
        if owns_slot {
            match &result {
                Ok(value) => {
                    slots.insert(
                        key.to_string(),
                        Slot::Ready {
                            value: value.clone(),
                            expire_at: Instant::now() + ttl,
                        },
                    );
                }
                Err(_) => {
                    slots.remove(key);
                }
            }
        }
        result
    }

    /// Live value for `key`, if any. Never returns an expired value.
    pub fn peek(&self, key: &str) -> Option<T> {
        match self.lock().get(key) {
            Some(Slot::Ready { value, expire_at }) if Instant::now() < *expire_at => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Drop every entry, including in-flight handles.
    pub fn clear(&self) {
        self.lock().clear();
    }
}
