//! Request envelope: deadline, context trampoline and bounded backoff.
//!
//! Store callbacks may fire on whatever thread the transport owns. Every
//! request is therefore run as its own task and its completion is piped
//! back through a oneshot channel, so the caller observes the result on
//! its own execution context and per-context ordering is preserved.

use crate::client::{IndexError, IndexResult};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;

/// Run `fut` under `timeout`, completing on the caller's context.
pub async fn dispatch<T, F>(fut: F, timeout: Duration) -> IndexResult<T>
where
    F: Future<Output = IndexResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(IndexError::Timeout),
        };
        // The receiver going away means the caller gave up on the
        // request; there is nobody left to observe the result.
        let _ = tx.send(result);
    });
    match rx.await {
        Ok(result) => result,
        Err(_) => Err(IndexError::Transport("request task dropped".to_string())),
    }
}

/// Exponential backoff schedule for health-wait retries.
///
/// Attempt `k` (1-based) sleeps `2^k * base` before retrying.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    base: Duration,
    max_retries: u32,
}

impl Backoff {
    #[must_use]
    pub const fn new(base: Duration, max_retries: u32) -> Self {
        Self { base, max_retries }
    }

    /// Delay before retry `attempt` (1-based), or `None` once the
    /// schedule is exhausted.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.max_retries {
            return None;
        }
        Some(self.base * 2u32.saturating_pow(attempt))
    }
}
