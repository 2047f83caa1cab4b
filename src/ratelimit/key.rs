//! Rate limit key normalization and namespacing.

use std::fmt;

use crate::error::{Result, ThrottleError};

/// A normalized, namespaced rate limit key.
///
/// Normalization trims surrounding whitespace. Keys that are empty after
/// trimming are rejected rather than folded into a shared bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    namespaced: String,
}

impl LimitKey {
    /// Build the key `"{prefix}:{key}"`.
    pub fn new(prefix: &str, key: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ThrottleError::InvalidKey);
        }

        Ok(Self {
            namespaced: format!("{}:{}", prefix, key),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.namespaced
    }

    /// Store record name for one window index.
    /// Format: "{prefix}:{key}:{window_index}"
    pub fn window_key(&self, window_index: u64) -> String {
        format!("{}:{}", self.namespaced, window_index)
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.namespaced)
    }
}

/// Check that a key prefix is usable as a store namespace.
pub(crate) fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(ThrottleError::Config("key prefix must not be empty".to_string()));
    }
    if prefix.chars().any(char::is_whitespace) {
        return Err(ThrottleError::Config(format!(
            "key prefix must not contain whitespace: {:?}",
            prefix
        )));
    }
    Ok(())
}
