//! Per-provider request spacing for free-tier APIs.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::time::Instant;
use tracing::debug;

/// Default spacing between two calls to the same provider.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Cooperative throttle keeping calls to one provider at least `min_interval` apart.
///
/// Each key owns an independent slot. `acquire` reserves the next free slot for
/// its key while holding the lock, then sleeps outside of it, so concurrent
/// callers of the same key are spaced in arrival order and other keys are never
/// blocked.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, next_slot: Mutex::new(HashMap::new()) }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a call to `key` is allowed, then record it.
    pub async fn acquire(&self, key: &str) {
        let wait = self.reserve(key, Instant::now());

        if !wait.is_zero() {
            debug!(provider = key, wait_ms = wait.as_millis() as u64, "rate limit wait");
            tokio::time::sleep(wait).await;
        }
    }

    /// Claim the next slot for `key` and return how long the caller must wait for it.
    fn reserve(&self, key: &str, now: Instant) -> Duration {
        let mut slots = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);

        let slot = match slots.get(key) {
            Some(&last) => (last + self.min_interval).max(now),
            None => now,
        };
        slots.insert(key.to_owned(), slot);

        slot.saturating_duration_since(now)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_call_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("nominatim").await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn successive_calls_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("nominatim").await;
        limiter.acquire("nominatim").await;
        limiter.acquire("nominatim").await;

        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_remainder_is_waited() {
        let limiter = RateLimiter::new(Duration::from_secs(1));

        limiter.acquire("google").await;
        tokio::time::sleep(Duration::from_millis(700)).await;

        let before = Instant::now();
        limiter.acquire("google").await;
        let waited = before.elapsed();

        assert!(waited >= Duration::from_millis(300));
        assert!(waited < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn different_keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("google").await;
        limiter.acquire("opencage").await;
        limiter.acquire("nominatim").await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_get_distinct_slots() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(1)));
        let start = Instant::now();

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire("openweather").await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for task in tasks {
            finished.push(task.await.unwrap().duration_since(start));
        }
        finished.sort();

        assert_eq!(finished[0], Duration::ZERO);
        assert!(finished[1] >= Duration::from_secs(1));
        assert!(finished[2] >= Duration::from_secs(2));
    }

    #[test]
    fn zero_interval_never_waits() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let now = Instant::now();

        assert_eq!(limiter.reserve("google", now), Duration::ZERO);
        assert_eq!(limiter.reserve("google", now), Duration::ZERO);
    }
}
