use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Token bucket plus optional settle delays used to keep outbound media traffic polite.
///
/// `rps == 0` disables the bucket; zero delays are skipped entirely.
pub struct Pacer {
    limiter: Option<DefaultDirectRateLimiter>,
    after_fetch: Duration,
    before_send: Duration,
}

impl Pacer {
    pub fn new(rps: u32, after_fetch: Duration, before_send: Duration) -> Self {
        let limiter = NonZeroU32::new(rps).map(|n| RateLimiter::direct(Quota::per_second(n)));
        Self {
            limiter,
            after_fetch,
            before_send,
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Wait for a token from the bucket (no-op when disabled).
    pub async fn wait_turn(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    pub async fn settle_after_fetch(&self) {
        sleep_nonzero(self.after_fetch).await;
    }

    pub async fn settle_before_send(&self) {
        sleep_nonzero(self.before_send).await;
    }
}

async fn sleep_nonzero(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn disabled_pacer_never_waits() {
        let pacer = Pacer::disabled();
        let started = Instant::now();
        for _ in 0..50 {
            pacer.wait_turn().await;
            pacer.settle_after_fetch().await;
            pacer.settle_before_send().await;
        }
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn bucket_allows_initial_burst() {
        let pacer = Pacer::new(4, Duration::ZERO, Duration::ZERO);
        let started = Instant::now();
        for _ in 0..4 {
            pacer.wait_turn().await;
        }
        assert!(started.elapsed() < Duration::from_millis(200));
    }
}
