//! Store adapter: the narrow capability the distributed algorithm needs
//! from a shared atomic counter store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::clock::{self, Clock};

/// Failures reported by a counter store.
///
/// All of them mean "no decision could be made"; none of them is a deny.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("store operation timed out")]
    Timeout,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Atomic counter store shared by every limiter instance.
///
/// Implementations must make `incr_with_expiry` indivisible: concurrent
/// callers on any machine each observe a distinct post-increment value.
/// Implementations never retry internally on behalf of the limiter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Add `amount` to the counter at `key`, creating it with `ttl` if absent,
    /// and return the post-increment value.
    async fn incr_with_expiry(
        &self,
        key: &str,
        amount: u64,
        ttl: Duration,
    ) -> Result<i64, StoreError>;

    /// Remaining time to live of `key`, if the store can report it.
    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
        Ok(None)
    }

    /// Release connection resources. Stored counters are left untouched.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Record {
    value: i64,
    expires_at: Duration,
}

/// In-process [`CounterStore`] with per-record expiry.
///
/// Useful for sharing one quota between several limiters in a process and
/// for tests; expired records are replaced lazily on increment and dropped
/// by [`MemoryStore::purge_expired`].
pub struct MemoryStore {
    records: DashMap<String, Record>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(clock::system())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Current value of `key`, or `None` if absent or expired.
    pub fn get(&self, key: &str) -> Option<i64> {
        let now = self.clock.now();
        self.records
            .get(key)
            .filter(|record| record.expires_at > now)
            .map(|record| record.value)
    }

    /// Drop expired records, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at > now);
        before.saturating_sub(self.records.len())
    }

    /// Number of stored records, expired ones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn incr_with_expiry(
        &self,
        key: &str,
        amount: u64,
        ttl: Duration,
    ) -> Result<i64, StoreError> {
        let now = self.clock.now();
        let amount = i64::try_from(amount)
            .map_err(|_| StoreError::Unavailable(format!("increment {} out of range", amount)))?;
        let expires_at = now.checked_add(ttl).unwrap_or(Duration::MAX);

        // The entry guard holds the shard lock, making read-modify-write atomic.
        let mut record = self.records.entry(key.to_string()).or_insert(Record {
            value: 0,
            expires_at,
        });
        if record.expires_at <= now {
            *record = Record {
                value: 0,
                expires_at,
            };
        }
        record.value = record.value.saturating_add(amount);
        Ok(record.value)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .records
            .get(key)
            .filter(|record| record.expires_at > now)
            .map(|record| record.expires_at - now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (ManualClock, MemoryStore) {
        let clock = ManualClock::new(Duration::from_secs(10_000));
        let store = MemoryStore::with_clock(Arc::new(clock.clone()));
        (clock, store)
    }

    #[tokio::test]
    async fn test_memory_store_increment() {
        let (_clock, store) = store();
        let ttl = Duration::from_secs(60);

        assert_eq!(store.incr_with_expiry("k", 1, ttl).await.unwrap(), 1);
        assert_eq!(store.incr_with_expiry("k", 1, ttl).await.unwrap(), 2);
        assert_eq!(store.incr_with_expiry("k", 5, ttl).await.unwrap(), 7);
        assert_eq!(store.get("k"), Some(7));
    }

    #[tokio::test]
    async fn test_memory_store_separate_keys() {
        let (_clock, store) = store();
        let ttl = Duration::from_secs(60);

        store.incr_with_expiry("key1", 1, ttl).await.unwrap();
        store.incr_with_expiry("key1", 1, ttl).await.unwrap();
        store.incr_with_expiry("key2", 1, ttl).await.unwrap();

        assert_eq!(store.get("key1"), Some(2));
        assert_eq!(store.get("key2"), Some(1));
    }

    #[tokio::test]
    async fn test_ttl_is_set_on_creation_only() {
        let (clock, store) = store();
        let ttl = Duration::from_secs(10);

        store.incr_with_expiry("k", 1, ttl).await.unwrap();
        clock.advance(Duration::from_secs(4));
        store.incr_with_expiry("k", 1, ttl).await.unwrap();

        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(6)));
        assert_eq!(store.ttl("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_record_restarts_from_zero() {
        let (clock, store) = store();
        let ttl = Duration::from_secs(5);

        store.incr_with_expiry("k", 3, ttl).await.unwrap();
        clock.advance(Duration::from_secs(5));

        assert_eq!(store.get("k"), None);
        assert_eq!(store.ttl("k").await.unwrap(), None);
        assert_eq!(store.incr_with_expiry("k", 1, ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates_instead_of_overflowing() {
        let (_clock, store) = store();

        assert_eq!(store.incr_with_expiry("k", 1, Duration::MAX).await.unwrap(), 1);
        assert_eq!(store.incr_with_expiry("k", 1, Duration::MAX).await.unwrap(), 2);
        assert!(store.ttl("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (clock, store) = store();

        store.incr_with_expiry("short", 1, Duration::from_secs(1)).await.unwrap();
        store.incr_with_expiry("long", 1, Duration::from_secs(60)).await.unwrap();
        clock.advance(Duration::from_secs(2));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long"), Some(1));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_distinct() {
        let store = Arc::new(MemoryStore::new());
        let ttl = Duration::from_secs(60);

        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.incr_with_expiry("k", 1, ttl).await.unwrap() })
            })
            .collect();

        let mut values: Vec<i64> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        values.sort_unstable();

        assert_eq!(values, (1..=100).collect::<Vec<i64>>());
    }
}
