use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Enforces a minimum spacing between external calls.
///
/// One limiter is shared by every worker of a client, so the overall call
/// rate, not the per-worker rate, honors the service quota. The lock is held
/// across the sleep on purpose: that is what serializes concurrent callers.
pub struct RateLimiter {
    last_call: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_call: Mutex::new(None),
            min_interval,
        }
    }

    /// Sleep if needed, then record this call as the most recent one.
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
