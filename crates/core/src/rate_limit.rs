use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Inter-request pacing for REST-issuing components: the catalog client,
/// the snapshot fetcher, and the lifecycle manager's fan-out calls.
///
/// The original scripts used an unspecified sleep somewhere in the
/// 0.025-0.5s range; this fixes it at 40ms (25 req/s), comfortably under
/// Deribit's 20-40 req/s venue limit, and documents the choice in one place
/// instead of a magic sleep duplicated at each call site.
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(40);

    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Sleeps, if needed, so that successive calls are spaced by at least
    /// `min_interval`. Safe to call from multiple concurrent tasks.
    pub async fn acquire(&self) {
        let wait = {
            let mut last = self.last.lock().expect("rate limiter mutex poisoned");
            let now = Instant::now();
            let wait = match *last {
                Some(prev) => self.min_interval.checked_sub(now.duration_since(prev)),
                None => None,
            };
            *last = Some(now + wait.unwrap_or_default());
            wait
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}
