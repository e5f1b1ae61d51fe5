// ABOUTME: Deadline-bounded polling with a pluggable clock
// ABOUTME: Used for every readiness and health wait so no wait can hang past its deadline

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, Instant};

/// Time source for polling loops
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Suspend for the given duration
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `check` every `interval` until it returns true or `deadline` elapses.
///
/// The check always runs at least once. Returns `true` as soon as a check passes and
/// `false` once the deadline has elapsed without a passing check.
pub async fn poll<C, F, Fut>(clock: &C, interval: Duration, deadline: Duration, mut check: F) -> bool
where
    C: Clock + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = clock.now();

    loop {
        if check().await {
            return true;
        }

        let elapsed = clock.now().saturating_duration_since(start);
        if elapsed >= deadline {
            return false;
        }

        clock.sleep(interval.min(deadline - elapsed)).await;
    }
}
