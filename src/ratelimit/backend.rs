//! Admission backend trait for abstracting local and distributed implementations.

use async_trait::async_trait;

use crate::error::Result;

use super::{Decision, DistributedWindow, LimitKey, LocalWindowTracker, Quota};

/// Trait for admission algorithm implementations.
///
/// This trait abstracts over both the in-process [`LocalWindowTracker`] and
/// the store-backed [`DistributedWindow`] so the [`Limiter`](super::Limiter)
/// facade can hold either.
#[async_trait]
pub trait AdmissionBackend: Send + Sync {
    /// Charge `hits` against `quota` for `key` and decide.
    async fn allow(&self, key: &LimitKey, quota: &Quota, hits: u64) -> Result<Decision>;

    /// Release held resources. Shared counter state is never cleared.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AdmissionBackend for LocalWindowTracker {
    async fn allow(&self, key: &LimitKey, quota: &Quota, hits: u64) -> Result<Decision> {
        Ok(LocalWindowTracker::allow(self, key, quota, hits))
    }

    async fn close(&self) -> Result<()> {
        self.clear();
        Ok(())
    }
}

#[async_trait]
impl AdmissionBackend for DistributedWindow {
    async fn allow(&self, key: &LimitKey, quota: &Quota, hits: u64) -> Result<Decision> {
        DistributedWindow::allow(self, key, quota, hits).await
    }

    async fn close(&self) -> Result<()> {
        self.store().close().await?;
        Ok(())
    }
}
