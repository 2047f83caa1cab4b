//! In-process window tracker for single-process mode.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::clock::{self, Clock};
use crate::error::{Result, ThrottleError};

use super::counter::WindowCounter;
use super::{Decision, LimitKey, Quota};

/// Default number of idle windows before a key is evicted.
const DEFAULT_IDLE_MULTIPLIER: u32 = 2;
/// Default minimum time between eviction sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Controls when idle keys are dropped from the local tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// A key unseen for this many of its windows is evicted
    pub idle_multiplier: u32,
    /// Sweeps run at most this often, inline on a checking caller
    pub sweep_interval: Duration,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            idle_multiplier: DEFAULT_IDLE_MULTIPLIER,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl EvictionPolicy {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.idle_multiplier == 0 {
            return Err(ThrottleError::Config(
                "eviction idle multiplier must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fixed-window tracker holding one counter per key in process memory.
///
/// Each key has its own mutex, so checks on different keys never contend.
pub struct LocalWindowTracker {
    /// Counters indexed by namespaced key
    counters: DashMap<String, Arc<Mutex<WindowCounter>>>,
    clock: Arc<dyn Clock>,
    eviction: EvictionPolicy,
    /// When the last eviction sweep was claimed, in milliseconds
    last_sweep_ms: AtomicU64,
}

impl LocalWindowTracker {
    /// Create a tracker on the system clock with default eviction.
    pub fn new() -> Self {
        Self::with_clock(clock::system(), EvictionPolicy::default())
    }

    pub fn with_clock(clock: Arc<dyn Clock>, eviction: EvictionPolicy) -> Self {
        let now = clock.now();
        Self {
            counters: DashMap::new(),
            clock,
            eviction,
            last_sweep_ms: AtomicU64::new(millis(now)),
        }
    }

    /// Charge `hits` against `quota` for `key`.
    pub fn allow(&self, key: &LimitKey, quota: &Quota, hits: u64) -> Decision {
        let now = self.clock.now();
        self.maybe_sweep(now);

        loop {
            // Shared read on the hot path; the write lock is only for new keys.
            let existing = self.counters.get(key.as_str()).map(|entry| entry.value().clone());
            let counter = match existing {
                Some(counter) => counter,
                None => self
                    .counters
                    .entry(key.as_str().to_string())
                    .or_insert_with(|| {
                        debug!(key = %key, quota = %quota, "Creating new local window counter");
                        Arc::new(Mutex::new(WindowCounter::new(now, quota.window())))
                    })
                    .clone(),
            };

            let mut counter = counter.lock();
            if counter.is_evicted() {
                // Lost a race with a sweep; the map now holds a fresh counter or none.
                continue;
            }

            let decision = counter.try_acquire(now, quota, hits);
            trace!(
                key = %key,
                hits = hits,
                allowed = decision.allowed,
                remaining = decision.remaining,
                "Local window check"
            );
            return decision;
        }
    }

    /// Admissions charged to `key` in its current window.
    ///
    /// Returns `None` if no counter exists for the key.
    pub fn current_count(&self, key: &LimitKey) -> Option<u64> {
        let counter = self.counters.get(key.as_str())?.clone();
        let count = counter.lock().current_count(self.clock.now());
        Some(count)
    }

    /// Get the number of tracked keys.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Drop every counter.
    pub fn clear(&self) {
        self.counters.retain(|_, counter| {
            counter.lock().evict();
            false
        });
    }

    /// Evict keys idle for longer than the policy allows.
    ///
    /// Returns the number of evicted keys.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(self.clock.now())
    }

    fn maybe_sweep(&self, now: Duration) {
        let now_ms = millis(now);
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < millis(self.eviction.sweep_interval) {
            return;
        }
        // One caller claims the sweep; everyone else goes straight to their key.
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.evict_idle_at(now);
    }

    fn evict_idle_at(&self, now: Duration) -> usize {
        let multiplier = self.eviction.idle_multiplier;
        let before = self.counters.len();

        self.counters.retain(|_, counter| {
            // A locked counter is in use and therefore not idle.
            let Some(mut counter) = counter.try_lock() else {
                return true;
            };
            if counter.is_idle(now, multiplier) {
                counter.evict();
                false
            } else {
                true
            }
        });

        let evicted = before.saturating_sub(self.counters.len());
        if evicted > 0 {
            debug!(evicted = evicted, remaining = self.counters.len(), "Evicted idle local counters");
        }
        evicted
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for LocalWindowTracker {
    fn default() -> Self {
        Self::new()
    }
}
