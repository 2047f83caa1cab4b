//! Distributed fixed-window rate limiting over a shared counter store.
//!
//! Every caller derives the same window index from wall time, so callers on
//! different machines land on the same store record without agreeing on a
//! start time. Each check is exactly one atomic increment.
//!
//! Known property: because windows are fixed, up to `2 × rate` admissions can
//! occur across a window boundary (the tail of one window plus the head of
//! the next).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::clock::{self, Clock};
use crate::error::Result;

use super::store::{CounterStore, StoreError};
use super::{Decision, LimitKey, Quota};

/// Fixed-window limiter whose counters live in a [`CounterStore`].
pub struct DistributedWindow {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl DistributedWindow {
    /// Create a distributed limiter on the system clock.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_clock(store, clock::system())
    }

    pub fn with_clock(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Charge `hits` against `quota` for `key`.
    ///
    /// The increment happens before the decision, so denied attempts are
    /// charged too. Store failures are returned as errors, never as a grant
    /// or a deny, and are not retried.
    pub async fn allow(&self, key: &LimitKey, quota: &Quota, hits: u64) -> Result<Decision> {
        let now_ms = self.clock.now().as_millis() as u64;
        let window_ms = quota.window_ms();
        let window_index = now_ms / window_ms;
        let record = key.window_key(window_index);

        trace!(
            key = %key,
            window_index = window_index,
            hits = hits,
            "Checking distributed rate limit"
        );

        let count = self
            .store
            .incr_with_expiry(&record, hits, quota.window())
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Counter store increment failed");
                e
            })?;

        let count = u64::try_from(count).map_err(|_| {
            warn!(key = %key, count = count, "Counter store returned a negative count");
            StoreError::Unavailable(format!("negative counter {} for {}", count, record))
        })?;
        let rate = quota.rate();
        if count <= rate {
            return Ok(Decision::allowed(rate, rate - count));
        }

        // The next window index starts at the boundary whatever the record's
        // TTL says; a shorter TTL only comes from clock skew between callers.
        let until_boundary = Duration::from_millis(window_ms - now_ms % window_ms);
        let retry_after = match self.store.ttl(&record).await {
            Ok(Some(ttl)) => ttl.min(until_boundary),
            Ok(None) => until_boundary,
            Err(e) => {
                // The deny already stands; only the hint degrades.
                debug!(key = %key, error = %e, "Counter TTL unavailable, using window boundary");
                until_boundary
            }
        };

        debug!(
            key = %key,
            count = count,
            limit = rate,
            excess = count - rate,
            retry_after_ms = retry_after.as_millis() as u64,
            "Distributed rate limit exceeded"
        );

        Ok(Decision::denied(rate, retry_after))
    }

    /// Get the store.
    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }
}
