//! Time sources for window arithmetic.
//!
//! Window boundaries are derived from wall time so that independent
//! processes sharing a store agree on them without coordination.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

/// Supplies the current time as a duration since the UNIX epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        // A clock set before 1970 collapses onto the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// Manually driven clock for deterministic tests.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    current: Arc<RwLock<Duration>>,
}

impl ManualClock {
    /// Create a clock frozen at `start` (since the UNIX epoch).
    pub fn new(start: Duration) -> Self {
        Self {
            current: Arc::new(RwLock::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.write();
        *current += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Duration) {
        *self.current.write() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.current.read()
    }
}

/// Shared default clock.
pub(crate) fn system() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
