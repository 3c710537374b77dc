use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// A token bucket rate limiter for controlling request rates
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum number of requests allowed in a time period
    capacity: usize,
    /// Time period for token replenishment in milliseconds
    refill_time_ms: u64,
    /// Current token count and the last time tokens were refilled
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: usize,
    last_refill: Instant,
}

impl RateLimiter {
    /// Creates a new rate limiter
    ///
    /// # Arguments
    ///
    /// * `requests_per_period` - Maximum number of requests allowed in the given time period
    /// * `period_ms` - Time period in milliseconds for the rate limit (e.g., 1000 for 1 second)
    pub fn new(requests_per_period: usize, period_ms: u64) -> Self {
        Self {
            capacity: requests_per_period.max(1),
            refill_time_ms: period_ms.max(1),
            bucket: Mutex::new(Bucket {
                tokens: requests_per_period.max(1),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Waits until a token is available and takes it
    pub async fn acquire(&self) {
        loop {
            let wait_time = self.try_acquire().await;

            if wait_time == Duration::ZERO {
                return;
            }

            debug!("Request budget exhausted, waiting for {:?}", wait_time);
            sleep(wait_time).await;
        }
    }

    /// Tries to take a token from the bucket. If none is available,
    /// returns the duration to wait before retrying.
    async fn try_acquire(&self) -> Duration {
        let mut bucket = self.bucket.lock().await;
        let now = Instant::now();

        let elapsed = now.duration_since(bucket.last_refill).as_millis() as u64;

        if elapsed >= self.refill_time_ms {
            let periods = elapsed / self.refill_time_ms;
            bucket.tokens = (bucket.tokens + periods as usize * self.capacity).min(self.capacity);
            bucket.last_refill = now - Duration::from_millis(elapsed % self.refill_time_ms);
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            Duration::ZERO
        } else {
            let time_since_last_refill = now.duration_since(bucket.last_refill).as_millis() as u64;
            Duration::from_millis(self.refill_time_ms.saturating_sub(time_since_last_refill))
        }
    }

    /// Tokens currently left in the bucket, without refilling
    pub async fn available(&self) -> usize {
        self.bucket.lock().await.tokens
    }
}

/// Rate limiter sized for Microsoft Graph directory requests
///
/// Graph throttles directory reads per app and tenant; staying at a steady
/// ten requests per second keeps a full membership scan of a large tenant
/// below the documented limits.
pub fn create_graph_limiter() -> RateLimiter {
    RateLimiter::new(10, 1000)
}
