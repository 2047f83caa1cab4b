//! The limiter facade: the public entry point for admission checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, trace};

use crate::clock;
use crate::config::ThrottlingConfig;
use crate::error::{Result, ThrottleError};

use super::{
    AdmissionBackend, CheckContext, Decision, DistributedWindow, LimitKey, LocalWindowTracker,
    Mode, Options, Quota, RedisStore,
};
use super::options::Backing;

/// Upper bound on the random jitter added to each `wait` pause.
const MAX_WAIT_JITTER: Duration = Duration::from_millis(25);

/// Lifecycle state of a [`Limiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterState {
    Ready,
    Closed,
}

/// Rate limiter facade.
///
/// Built from [`Options`], it resolves keys into the configured namespace and
/// delegates each check to either a [`LocalWindowTracker`] or a
/// [`DistributedWindow`]. It is safe to share across tasks behind an `Arc`.
pub struct Limiter {
    backend: Arc<dyn AdmissionBackend>,
    mode: Mode,
    quota: Quota,
    key_prefix: String,
    timeout: Option<Duration>,
    closed: AtomicBool,
}

impl Limiter {
    /// Validate `options` and build a ready limiter.
    pub fn new(options: Options) -> Result<Self> {
        let (backing, quota) = options.validate()?;
        let mode = backing.mode();
        let clock = options.clock.unwrap_or_else(clock::system);

        let backend: Arc<dyn AdmissionBackend> = match backing {
            Backing::Distributed(store) => Arc::new(DistributedWindow::with_clock(store, clock)),
            Backing::Local => Arc::new(LocalWindowTracker::with_clock(clock, options.eviction)),
        };

        info!(
            mode = %mode,
            quota = %quota,
            key_prefix = %options.key_prefix,
            "Rate limiter initialized"
        );

        Ok(Self {
            backend,
            mode,
            quota,
            key_prefix: options.key_prefix,
            timeout: options.timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// Build a limiter from configuration, connecting the Redis store when a
    /// URL is configured.
    pub async fn from_config(config: &ThrottlingConfig) -> Result<Self> {
        let mut options = Options::from_config(config);
        if let Some(url) = &config.store.redis_url {
            let store = RedisStore::connect(url).await?;
            options = options.with_store(Arc::new(store));
        }
        Self::new(options)
    }

    /// Check `key` against the default quota.
    pub async fn allow(&self, key: &str) -> Result<Decision> {
        self.allow_n(&CheckContext::new(), key, self.quota, 1).await
    }

    /// Check `key` against a per-call quota.
    pub async fn allow_quota(&self, key: &str, quota: Quota) -> Result<Decision> {
        self.allow_n(&CheckContext::new(), key, quota, 1).await
    }

    /// Check `key` against `quota`, bounded by `ctx`.
    pub async fn allow_with_context(
        &self,
        ctx: &CheckContext,
        key: &str,
        quota: Quota,
    ) -> Result<Decision> {
        self.allow_n(ctx, key, quota, 1).await
    }

    /// Charge `hits` units against `quota` for `key` in one check.
    ///
    /// `hits` must be between 1 and the quota's rate.
    pub async fn allow_n(
        &self,
        ctx: &CheckContext,
        key: &str,
        quota: Quota,
        hits: u64,
    ) -> Result<Decision> {
        self.ensure_ready()?;
        if hits == 0 || hits > quota.rate() {
            return Err(ThrottleError::Config(format!(
                "hits must be between 1 and {}, got {}",
                quota.rate(),
                hits
            )));
        }
        let key = LimitKey::new(&self.key_prefix, key)?;

        let ctx = ctx.clone().or_timeout(self.timeout);
        let decision = ctx.run(self.backend.allow(&key, &quota, hits)).await?;

        trace!(
            key = %key,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "Admission check"
        );
        Ok(decision)
    }

    /// Wait until `key` is admitted under the default quota.
    ///
    /// Sleeps for each denial's `retry_after` (plus a little jitter) and
    /// checks again. Every attempt is charged against the quota, so a waiting
    /// caller competes with other callers for the next window. Bounded by
    /// `ctx` and the default timeout.
    pub async fn wait(&self, ctx: &CheckContext, key: &str) -> Result<Decision> {
        let ctx = ctx.clone().or_timeout(self.timeout);
        loop {
            let decision = self.allow_n(&ctx, key, self.quota, 1).await?;
            if decision.allowed {
                return Ok(decision);
            }

            let pause =
                decision.retry_after.max(Duration::from_millis(1)) + jitter(decision.retry_after);
            debug!(key = %key, pause_ms = pause.as_millis() as u64, "Waiting for admission");
            ctx.sleep(pause).await?;
        }
    }

    /// Shut the limiter down, releasing store connections.
    ///
    /// Idempotent. Counter state in a shared store is left in place for
    /// other processes.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(mode = %self.mode, "Closing rate limiter");
        self.backend.close().await
    }

    pub fn state(&self) -> LimiterState {
        if self.closed.load(Ordering::SeqCst) {
            LimiterState::Closed
        } else {
            LimiterState::Ready
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == LimiterState::Closed
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn default_quota(&self) -> Quota {
        self.quota
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            LimiterState::Ready => Ok(()),
            LimiterState::Closed => Err(ThrottleError::Closed),
        }
    }
}

/// Random extra pause so waiters denied together do not retry together.
fn jitter(retry_after: Duration) -> Duration {
    let cap = (retry_after / 10).min(MAX_WAIT_JITTER);
    if cap.is_zero() {
        return Duration::ZERO;
    }
    let cap_us = cap.as_micros() as u64;
    Duration::from_micros(rand::thread_rng().gen_range(0..=cap_us))
}
