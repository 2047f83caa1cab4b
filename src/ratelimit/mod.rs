//! Rate limiting logic and state management.

mod backend;
mod context;
mod counter;
mod distributed;
mod key;
mod limiter;
mod local;
mod options;
mod quota;
mod redis_store;
mod store;

use std::time::Duration;

use serde::{Serialize, Serializer};

pub use backend::AdmissionBackend;
pub use context::CheckContext;
pub use distributed::DistributedWindow;
pub use key::LimitKey;
pub use limiter::{Limiter, LimiterState};
pub use local::{EvictionPolicy, LocalWindowTracker};
pub use options::{Mode, Options};
pub use quota::{Quota, MAX_WINDOW};
pub use redis_store::RedisStore;
pub use store::{CounterStore, MemoryStore, StoreError};

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the unit of work may proceed.
    pub allowed: bool,
    /// The rate that was applied.
    pub limit: u64,
    /// Best-effort remaining admissions in the current window.
    pub remaining: u64,
    /// Suggested wait before retrying a denied check. Zero on grants.
    #[serde(rename = "retry_after_ms", serialize_with = "serialize_millis")]
    pub retry_after: Duration,
}

impl Decision {
    pub(crate) fn allowed(limit: u64, remaining: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            retry_after: Duration::ZERO,
        }
    }

    pub(crate) fn denied(limit: u64, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            retry_after,
        }
    }
}

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}
