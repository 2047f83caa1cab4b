//! Quota definition: `rate` admissions per `window`.

use std::fmt;
use std::time::Duration;

use crate::error::{Result, ThrottleError};

/// Longest accepted window; its millisecond length fits a Redis PEXPIRE.
pub const MAX_WINDOW: Duration = Duration::from_millis(i64::MAX as u64);

/// A validated `(rate, window)` pair.
///
/// Both parts are strictly positive; a `Quota` cannot be built otherwise.
/// Windows are tracked at millisecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quota {
    rate: u64,
    window: Duration,
}

impl Quota {
    /// Create a quota allowing `rate` events per `window`.
    pub fn new(rate: u64, window: Duration) -> Result<Self> {
        if rate == 0 {
            return Err(ThrottleError::Config(
                "quota rate must be greater than zero".to_string(),
            ));
        }
        if window < Duration::from_millis(1) {
            return Err(ThrottleError::Config(format!(
                "quota window must be at least 1ms, got {:?}",
                window
            )));
        }
        if window > MAX_WINDOW {
            return Err(ThrottleError::Config(format!(
                "quota window must be at most {}ms, got {:?}",
                MAX_WINDOW.as_millis(),
                window
            )));
        }
        Ok(Self { rate, window })
    }

    pub fn per_second(rate: u64) -> Result<Self> {
        Self::new(rate, Duration::from_secs(1))
    }

    pub fn per_minute(rate: u64) -> Result<Self> {
        Self::new(rate, Duration::from_secs(60))
    }

    pub fn per_hour(rate: u64) -> Result<Self> {
        Self::new(rate, Duration::from_secs(3600))
    }

    /// Admissions permitted per window.
    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Length of one window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in whole milliseconds (never zero).
    pub(crate) fn window_ms(&self) -> u64 {
        u64::try_from(self.window.as_millis())
            .unwrap_or(u64::MAX)
            .max(1)
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.rate, self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_constructors() {
        assert_eq!(Quota::per_second(10).unwrap().window(), Duration::from_secs(1));
        assert_eq!(Quota::per_minute(10).unwrap().window(), Duration::from_secs(60));
        assert_eq!(Quota::per_hour(10).unwrap().window(), Duration::from_secs(3600));
        assert_eq!(Quota::per_hour(10).unwrap().rate(), 10);
    }

    #[test]
    fn test_zero_rate_is_config_error() {
        let err = Quota::new(0, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ThrottleError::Config(_)));
    }

    #[test]
    fn test_zero_window_is_config_error() {
        let err = Quota::new(5, Duration::ZERO).unwrap_err();
        assert!(matches!(err, ThrottleError::Config(_)));

        let err = Quota::new(5, Duration::from_micros(999)).unwrap_err();
        assert!(matches!(err, ThrottleError::Config(_)));
    }

    #[test]
    fn test_oversized_window_is_config_error() {
        let err = Quota::new(5, Duration::MAX).unwrap_err();
        assert!(matches!(err, ThrottleError::Config(_)));

        let err = Quota::new(5, MAX_WINDOW + Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, ThrottleError::Config(_)));

        let quota = Quota::new(5, MAX_WINDOW).unwrap();
        assert_eq!(quota.window_ms(), i64::MAX as u64);
    }

    #[test]
    fn test_window_ms_truncates_sub_millisecond_part() {
        let quota = Quota::new(1, Duration::from_micros(2500)).unwrap();
        assert_eq!(quota.window_ms(), 2);
    }
}
