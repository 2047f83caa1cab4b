//! Error types for the throttling crate.

use std::time::Duration;

use thiserror::Error;

use crate::ratelimit::StoreError;

/// Main error type for throttling operations.
///
/// A denied request is not an error: it is reported through
/// [`Decision::allowed`](crate::ratelimit::Decision).
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Invalid quota, missing store for distributed mode, bad key prefix or
    /// an unreadable configuration source.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The key was empty or whitespace only.
    #[error("Invalid key: rate limit keys must not be empty")]
    InvalidKey,

    /// The coordination store could not be reached or failed the operation.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// The caller's deadline elapsed before a decision was reached.
    #[error("Timed out after {0:?} waiting for a decision")]
    Timeout(Duration),

    /// The caller's cancellation fired before a decision was reached.
    #[error("Check canceled before a decision was reached")]
    Canceled,

    /// The limiter was closed.
    #[error("Limiter is closed")]
    Closed,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ThrottleError {
    /// Whether the error came from the coordination store rather than the caller.
    ///
    /// Callers use this to apply their own fail-open or fail-closed policy.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, ThrottleError::StoreUnavailable(_))
    }
}

/// Result type alias for throttling operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;
