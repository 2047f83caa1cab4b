//! Per-key fixed-window counter used by the local tracker.

use std::time::Duration;

use super::{Decision, Quota};

/// Fixed-window state for one key.
///
/// Callers serialize access through a mutex; the counter itself holds no lock.
/// All times are durations since the UNIX epoch, as supplied by a
/// [`Clock`](crate::clock::Clock).
#[derive(Debug)]
pub(crate) struct WindowCounter {
    /// Admissions charged to the current window
    count: u64,
    /// When the current window started
    window_start: Duration,
    /// Window length used by the most recent check
    window: Duration,
    /// Last time the key was checked
    last_seen: Duration,
    /// Set once the counter has been removed from its map
    evicted: bool,
}

impl WindowCounter {
    /// Create an empty counter whose window starts at `now`.
    pub(crate) fn new(now: Duration, window: Duration) -> Self {
        Self {
            count: 0,
            window_start: now,
            window,
            last_seen: now,
            evicted: false,
        }
    }

    /// Charge `hits` against the quota if they fit in the current window.
    ///
    /// Denied checks are not charged.
    pub(crate) fn try_acquire(&mut self, now: Duration, quota: &Quota, hits: u64) -> Decision {
        self.window = quota.window();
        self.last_seen = self.last_seen.max(now);
        self.maybe_reset_window(now);

        let rate = quota.rate();
        match self.count.checked_add(hits) {
            Some(next) if next <= rate => {
                self.count = next;
                Decision::allowed(rate, rate - next)
            }
            _ => Decision::denied(rate, self.duration_until_reset(now)),
        }
    }

    /// Admissions in the current window, or zero once it has elapsed.
    pub(crate) fn current_count(&self, now: Duration) -> u64 {
        if self.elapsed(now) >= self.window {
            0
        } else {
            self.count
        }
    }

    /// Time remaining until the current window resets.
    pub(crate) fn duration_until_reset(&self, now: Duration) -> Duration {
        self.window.saturating_sub(self.elapsed(now))
    }

    /// Whether the key has gone unchecked for `multiplier` windows.
    pub(crate) fn is_idle(&self, now: Duration, multiplier: u32) -> bool {
        now.saturating_sub(self.last_seen) >= self.window.saturating_mul(multiplier)
    }

    pub(crate) fn evict(&mut self) {
        self.evicted = true;
    }

    pub(crate) fn is_evicted(&self) -> bool {
        self.evicted
    }

    fn elapsed(&self, now: Duration) -> Duration {
        // A clock stepping backwards keeps the current window open.
        now.saturating_sub(self.window_start)
    }

    /// Reset the window if it has expired.
    fn maybe_reset_window(&mut self, now: Duration) {
        if self.elapsed(now) >= self.window {
            self.count = 0;
            self.window_start = now;
        }
    }
}
