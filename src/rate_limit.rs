use std::time::Duration;

/// Minimum spacing between two accepted saves.
pub const DEFAULT_MIN_SAVE_INTERVAL: Duration = Duration::from_millis(2_000);

/// Debounce for persistence work.
///
/// A claim updates the last-save timestamp immediately, before any save work runs,
/// so two batches racing through the same window cannot both be accepted.
/// Callers that share a limiter must serialize `try_claim` (see `SessionController`).
#[derive(Clone, Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_save_ms: Option<u64>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_save_ms: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn last_save_ms(&self) -> Option<u64> {
        self.last_save_ms
    }

    /// Accept or reject a batch of `batch_len` detections observed at `now_ms`.
    pub fn try_claim(&mut self, batch_len: usize, now_ms: u64) -> bool {
        if batch_len == 0 {
            return false;
        }
        if let Some(last) = self.last_save_ms {
            let elapsed = now_ms.saturating_sub(last);
            if u128::from(elapsed) < self.min_interval.as_millis() {
                return false;
            }
        }
        self.last_save_ms = Some(now_ms);
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SAVE_INTERVAL)
    }
}
