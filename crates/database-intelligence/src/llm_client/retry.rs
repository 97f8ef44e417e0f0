//! Rate-limit retry loop shared by the embedding and generation clients.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

use crate::error::ProviderError;
use crate::metrics;

/// Exponential backoff for HTTP 429 responses.
///
/// `max_attempts` counts every call, the first one included. The last
/// rate-limited call fails straight away with no trailing sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` below 1 is raised to 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Sleep after failed call `attempt` (0-based): `base * 2^attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Injected so tests can observe backoff without waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept(&self) -> Vec<Duration> {
        match self.slept.lock() {
            Ok(slept) => slept.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        match self.slept.lock() {
            Ok(mut slept) => slept.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy is exhausted. Exhaustion yields [`ProviderError::RateLimitExceeded`].
pub async fn with_retry<T, F, Fut>(
    provider: &str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                let calls = attempt + 1;
                if calls >= max_attempts {
                    warn!("{} rate limit persisted after {} attempts", provider, calls);
                    return Err(ProviderError::RateLimitExceeded { attempts: calls });
                }
                let delay = policy.delay(attempt);
                warn!(
                    "{} rate limited, retrying in {:?} (attempt {}/{})",
                    provider,
                    delay,
                    calls + 1,
                    max_attempts
                );
                metrics::inc_provider_retry(provider);
                sleeper.sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
