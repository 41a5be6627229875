use std::{future::Future, time::Duration};

use log::*;
use rand::Rng;

use crate::traits::AnalyticsError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(25);

/// Bounded retries with jittered exponential backoff for writes that fail with
/// [`AnalyticsError::TransientStoreError`]. Any other error is returned immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, base_delay: DEFAULT_BASE_DELAY }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    /// A policy that tries exactly once.
    pub fn no_retries() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// The delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, plus up to 50% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        let delay = self.base_delay.saturating_mul(1 << exp);
        let jitter_ms = (delay.as_millis() as u64) / 2;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, AnalyticsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AnalyticsError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    let max = self.max_attempts;
                    debug!("🔁️ {label} hit a busy store (attempt {attempt}/{max}). Retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) if e.is_transient() => {
                    warn!("🔁️ {label} still failing after {attempt} attempts. {e}");
                    return Err(e);
                },
                result => return result,
            }
        }
    }
}
