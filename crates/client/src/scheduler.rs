//! Time source for delayed work.
//!
//! Polling intervals and redirect delays go through [`Scheduler`] so tests can
//! record the requested delays or drive them with paused tokio time.

use std::time::Duration;

use async_trait::async_trait;

/// Something that can wait.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Complete after `delay` has elapsed.
    async fn sleep(&self, delay: Duration);
}

/// [`Scheduler`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
