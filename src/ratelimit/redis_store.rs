//! Redis-backed counter store.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::{RedisError, Script};
use tracing::{debug, info};

use super::store::{CounterStore, StoreError};

/// Atomic INCRBY + PEXPIRE.
/// The expiry is applied when the record is created, and re-applied if a
/// record somehow exists without one so that no counter lives forever.
const INCR_WITH_EXPIRY_LUA: &str = r#"
local value = redis.call('INCRBY', KEYS[1], ARGV[1])
if value == tonumber(ARGV[1]) or redis.call('PTTL', KEYS[1]) < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return value
"#;

/// [`CounterStore`] over a Redis server.
///
/// The connection manager multiplexes every check over one connection and
/// reconnects on its own; this store adds no retries of its own.
pub struct RedisStore {
    manager: RwLock<Option<ConnectionManager>>,
    script: Script,
}

impl RedisStore {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        info!("Connected Redis counter store");
        Ok(Self::from_manager(manager))
    }

    /// Wrap an existing connection manager.
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self {
            manager: RwLock::new(Some(manager)),
            script: Script::new(INCR_WITH_EXPIRY_LUA),
        }
    }

    fn connection(&self) -> Result<ConnectionManager, StoreError> {
        self.manager
            .read()
            .clone()
            .ok_or_else(|| StoreError::Unavailable("store closed".to_string()))
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn incr_with_expiry(
        &self,
        key: &str,
        amount: u64,
        ttl: Duration,
    ) -> Result<i64, StoreError> {
        let mut conn = self.connection()?;
        let value: i64 = self
            .script
            .key(key)
            .arg(amount)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.connection()?;
        // -2: no such key, -1: no expiry
        let pttl: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        Ok(u64::try_from(pttl).ok().map(Duration::from_millis))
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.manager.write().take().is_some() {
            debug!("Released Redis connection manager");
        }
        Ok(())
    }
}

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_is_positive() {
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::MAX), i64::MAX);
    }

    #[test]
    fn test_redis_error_mapping() {
        let io = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(StoreError::from(io), StoreError::Connection(_)));

        let timeout = RedisError::from(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert_eq!(StoreError::from(timeout), StoreError::Timeout);

        let other = RedisError::from((redis::ErrorKind::ResponseError, "WRONGTYPE"));
        assert!(matches!(StoreError::from(other), StoreError::Unavailable(_)));
    }

    /// Requires a running Redis; set REDIS_URL and run with `--ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_redis_increment_with_expiry() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".into());
        let store = RedisStore::connect(&url).await.unwrap();
        let key = format!("throttling-test:{}", std::process::id());

        assert_eq!(store.incr_with_expiry(&key, 1, Duration::from_secs(5)).await.unwrap(), 1);
        assert_eq!(store.incr_with_expiry(&key, 2, Duration::from_secs(5)).await.unwrap(), 3);

        let ttl = store.ttl(&key).await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(5));

        store.close().await.unwrap();
        assert!(matches!(
            store.incr_with_expiry(&key, 1, Duration::from_secs(5)).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
