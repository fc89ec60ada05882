//! Rate limiting - Client-side throttle applied per API action
//!
//! Each action gets its own schedule: calls are handed consecutive slots
//! spaced `1 / per_second` apart, and a call whose slot lies in the future
//! sleeps until then. Actions never delay one another.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::debug;
use tokio::time::{Instant, sleep_until};

use crate::context::DEFAULT_RATE_LIMIT_PER_SEC;

/// Per-action limiter shared by every call a provider makes
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(per_second: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / per_second.max(1),
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `action` may be called again
    pub async fn check(&self, action: &str) {
        let slot = {
            let mut slots = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = slots.get(action).map_or(now, |next| (*next).max(now));
            slots.insert(action.to_string(), slot + self.interval);
            slot
        };

        let now = Instant::now();
        if slot > now {
            debug!("api[{}] rate limited, waiting {:?}", action, slot - now);
            sleep_until(slot).await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_PER_SEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_spaced_out() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();

        let mut finished = Vec::new();
        for _ in 0..5 {
            limiter.check("CreateResource").await;
            finished.push(start.elapsed());
        }

        assert_eq!(
            finished,
            vec![
                Duration::ZERO,
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(1500),
                Duration::from_millis(2000),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_the_schedule() {
        let limiter = RateLimiter::new(4);
        let start = Instant::now();

        tokio::join!(
            limiter.check("GetResource"),
            limiter.check("GetResource"),
            limiter.check("GetResource"),
        );

        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn actions_are_limited_independently() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();

        limiter.check("CreateResource").await;
        limiter.check("DeleteResource").await;
        limiter.check("GetResource").await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.check("GetResource").await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_is_not_banked() {
        let limiter = RateLimiter::new(1);
        limiter.check("GetResource").await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let start = Instant::now();
        limiter.check("GetResource").await;
        limiter.check("GetResource").await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }
}
