//! Construction-time options for a [`Limiter`](super::Limiter).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::ThrottlingConfig;
use crate::error::{Result, ThrottleError};

use super::key::validate_prefix;
use super::{CounterStore, EvictionPolicy, Quota};

/// Default rate when no specific rate is configured.
pub(crate) const DEFAULT_RATE: u64 = 1000;
/// Default window when no specific window is configured.
pub(crate) const DEFAULT_WINDOW: Duration = Duration::from_secs(1);
/// Default namespace for keys in a shared store.
pub(crate) const DEFAULT_KEY_PREFIX: &str = "throttling";

/// Where admission state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// In-process counters; limits apply per process.
    Local,
    /// Counters in a shared [`CounterStore`]; limits apply across processes.
    Distributed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Local => f.write_str("local"),
            Mode::Distributed => f.write_str("distributed"),
        }
    }
}

/// Where validated options place admission state.
#[derive(Clone)]
pub(crate) enum Backing {
    Local,
    Distributed(Arc<dyn CounterStore>),
}

impl Backing {
    pub(crate) fn mode(&self) -> Mode {
        match self {
            Backing::Local => Mode::Local,
            Backing::Distributed(_) => Mode::Distributed,
        }
    }
}

impl fmt::Debug for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Backing({})", self.mode())
    }
}

/// Declarative limiter configuration.
///
/// Setters may be chained in any order; a later call overrides an earlier
/// one. Nothing is validated until [`Limiter::new`](super::Limiter::new).
/// When `mode` is unset it is inferred: distributed if a store is present,
/// local otherwise.
#[derive(Clone)]
pub struct Options {
    pub store: Option<Arc<dyn CounterStore>>,
    pub mode: Option<Mode>,
    pub rate: u64,
    pub window: Duration,
    pub key_prefix: String,
    pub clock: Option<Arc<dyn Clock>>,
    /// Applied to checks whose context carries no deadline
    pub timeout: Option<Duration>,
    pub eviction: EvictionPolicy,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            store: None,
            mode: None,
            rate: DEFAULT_RATE,
            window: DEFAULT_WINDOW,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            clock: None,
            timeout: None,
            eviction: EvictionPolicy::default(),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("store", &self.store.is_some())
            .field("mode", &self.mode)
            .field("rate", &self.rate)
            .field("window", &self.window)
            .field("key_prefix", &self.key_prefix)
            .field("clock", &self.clock.is_some())
            .field("timeout", &self.timeout)
            .field("eviction", &self.eviction)
            .finish()
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options described by a loaded configuration.
    ///
    /// The store is not connected here; see
    /// [`Limiter::from_config`](super::Limiter::from_config).
    pub fn from_config(config: &ThrottlingConfig) -> Self {
        let limiter = &config.limiter;
        let mut options = Self::new()
            .with_rate(limiter.rate)
            .with_window(Duration::from_millis(limiter.window_ms))
            .with_key_prefix(limiter.key_prefix.clone())
            .with_eviction(EvictionPolicy {
                idle_multiplier: config.local.eviction_multiplier,
                sweep_interval: Duration::from_millis(config.local.sweep_interval_ms),
            });
        options.mode = limiter.mode;
        options.timeout = limiter.timeout_ms.map(Duration::from_millis);
        options
    }

    pub fn with_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_rate(mut self, rate: u64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set rate and window together.
    pub fn with_quota(self, quota: Quota) -> Self {
        self.with_rate(quota.rate()).with_window(quota.window())
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Override the time source. Intended for tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// The mode these options resolve to.
    pub fn resolved_mode(&self) -> Mode {
        self.mode.unwrap_or(if self.store.is_some() {
            Mode::Distributed
        } else {
            Mode::Local
        })
    }

    /// Validate option combinations, resolving the backing and default quota.
    pub(crate) fn validate(&self) -> Result<(Backing, Quota)> {
        let quota = Quota::new(self.rate, self.window)?;
        validate_prefix(&self.key_prefix)?;
        self.eviction.validate()?;

        if self.timeout == Some(Duration::ZERO) {
            return Err(ThrottleError::Config("timeout must be greater than zero".to_string()));
        }

        let backing = match (self.resolved_mode(), &self.store) {
            (Mode::Local, _) => Backing::Local,
            (Mode::Distributed, Some(store)) => Backing::Distributed(store.clone()),
            (Mode::Distributed, None) => {
                return Err(ThrottleError::Config(
                    "distributed mode requires a counter store".to_string(),
                ))
            }
        };

        Ok((backing, quota))
    }
}
