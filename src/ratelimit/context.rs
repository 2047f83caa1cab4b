//! Caller-supplied deadline and cancellation for a check.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ThrottleError};

/// Bounds a check with an optional deadline and cancellation token.
///
/// When either fires first the check resolves to
/// [`ThrottleError::Timeout`] or [`ThrottleError::Canceled`], never to a
/// grant or a deny.
#[derive(Debug, Clone, Default)]
pub struct CheckContext {
    /// Absolute deadline and the timeout it was derived from
    deadline: Option<(Instant, Duration)>,
    cancel: Option<CancellationToken>,
}

impl CheckContext {
    /// A context with no deadline and no cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up once `timeout` has elapsed from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        // A timeout too large to represent means no deadline.
        self.deadline = Instant::now().checked_add(timeout).map(|deadline| (deadline, timeout));
        self
    }

    /// Give up as soon as `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Apply `timeout` only if no deadline was set explicitly.
    pub(crate) fn or_timeout(self, timeout: Option<Duration>) -> Self {
        match (self.deadline, timeout) {
            (None, Some(timeout)) => self.with_timeout(timeout),
            _ => self,
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|(deadline, _)| deadline.saturating_duration_since(Instant::now()))
    }

    /// Drive `fut` to completion unless the deadline or cancellation fires first.
    pub(crate) async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_canceled() {
            return Err(ThrottleError::Canceled);
        }

        let bounded = async {
            match self.deadline {
                Some((deadline, timeout)) => match tokio::time::timeout_at(deadline, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(ThrottleError::Timeout(timeout)),
                },
                None => fut.await,
            }
        };

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(ThrottleError::Canceled),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        }
    }

    /// Sleep for `pause`, bounded by this context.
    pub(crate) async fn sleep(&self, pause: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(pause).await;
            Ok(())
        })
        .await
    }
}
