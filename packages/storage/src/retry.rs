//! Bounded exponential backoff for store operations.
//!
//! Only errors flagged transient by the backend ([`StorageError::is_transient`])
//! are retried. Everything else, including `NotFound`, fails immediately.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{StorageError, Store};

/// Retry limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay_ms: u64,
    /// Upper bound for a single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// Runs `op` until it succeeds, fails permanently, or the policy's attempts
/// are exhausted. The last error is returned.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, StorageError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, StorageError>> + Send,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "  {label}: retry {attempt}/{} in {delay:?}: {e}",
                    max_attempts - 1
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Wraps a [`Store`] so every operation is retried under a [`RetryPolicy`].
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Store> RetryingStore<S> {
    #[must_use]
    pub const fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: Store> Store for RetryingStore<S> {
    fn location(&self, key: &str) -> String {
        self.inner.location(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let label = self.inner.location(key);
        with_backoff(self.policy, &label, || self.inner.get(key)).await
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let label = self.inner.location(key);
        with_backoff(self.policy, &label, || self.inner.put(key, data.clone())).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let label = self.inner.location(prefix);
        with_backoff(self.policy, &label, || self.inner.list(prefix)).await
    }
}
