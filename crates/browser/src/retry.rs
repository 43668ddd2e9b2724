//! Bounded Retry Driver
//!
//! Both discovery loops (debug endpoint probing, target listing) are the
//! same machine: attempt, wait a fixed interval, attempt again, give up
//! after a fixed budget. Model it once, timer-driven, no busy-waiting.
//! Exhaustion is a normal `None` - callers decide what to tell the user.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fixed-interval, fixed-budget retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Profile for waiting on `/json/version` after a browser spawn:
    /// 60 attempts at 200ms, ~12s total.
    pub fn debug_endpoint() -> Self {
        Self::new(60, Duration::from_millis(200))
    }

    /// Profile for waiting on a matching entry in `/json`:
    /// 40 attempts at 500ms, ~20s total.
    pub fn target_listing() -> Self {
        Self::new(40, Duration::from_millis(500))
    }

    /// Run `attempt` until it yields `Some`, the budget is spent, or
    /// `cancel` fires. Cancellation and exhaustion both resolve to `None`.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut attempt: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        for n in 1..=self.attempts {
            if cancel.is_cancelled() {
                tracing::debug!("retry loop cancelled before attempt {n}");
                return None;
            }

            if let Some(value) = attempt().await {
                return Some(value);
            }

            if n < self.attempts {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("retry loop cancelled after attempt {n}");
                        return None;
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        None
    }
}
