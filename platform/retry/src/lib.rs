//! Exponential backoff with full jitter.
//!
//! Two things live here:
//!
//! - [`full_jitter_delay_ms`], the backoff formula the async queue and the
//!   event engine use to compute `next_run_at` / `next_attempt_at` after a
//!   retryable failure: `delay = min(max, base * 2^(attempt-1))`, jittered
//!   uniformly over `[0, delay]`.
//! - [`retry_with_backoff`], a generic in-process retry loop for callers
//!   that want to retry a fallible async operation directly (e.g. a single
//!   `Executor` call) rather than going back through a lease/requeue cycle.

use rand::Rng;
use std::time::Duration;
use tracing::warn;

/// Full-jitter exponential backoff, in milliseconds.
///
/// `attempt` is 1-based (the attempt number that just failed). `base_ms`
/// and `max_ms` bound the un-jittered delay before the random draw.
pub fn full_jitter_delay_ms(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    let exp = attempt.saturating_sub(1).min(63);
    let unjittered = base_ms.saturating_mul(1u64 << exp).min(max_ms);
    if unjittered == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=unjittered)
}

/// Configuration for [`retry_with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_ms: 100,
            max_ms: 30_000,
        }
    }
}

/// Retry a fallible async operation with full-jitter exponential backoff.
///
/// Returns `Ok(T)` on the first success, or `Err(E)` once `max_attempts`
/// have been exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    config: &RetryConfig,
    context: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= config.max_attempts {
                    warn!(
                        context,
                        attempts = attempt,
                        error = %e,
                        "operation failed after max retries"
                    );
                    return Err(e);
                }

                let delay_ms = full_jitter_delay_ms(attempt, config.base_ms, config.max_ms);
                warn!(
                    context,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms,
                    error = %e,
                    "operation failed, retrying with backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn full_jitter_never_exceeds_unjittered_delay() {
        for attempt in 1..20 {
            let base = 1000;
            let max = 60_000;
            let exp = (attempt as u32).saturating_sub(1).min(63);
            let unjittered = (base as u64).saturating_mul(1u64 << exp).min(max);
            for _ in 0..50 {
                let d = full_jitter_delay_ms(attempt, base, max);
                assert!(d <= unjittered, "{d} should be <= {unjittered}");
            }
        }
    }

    #[test]
    fn full_jitter_caps_at_max() {
        let d = full_jitter_delay_ms(50, 1000, 60_000);
        assert!(d <= 60_000);
    }

    #[tokio::test]
    async fn retry_succeeds_first_attempt() {
        let config = RetryConfig::default();
        let result = retry_with_backoff(|| async { Ok::<_, String>(42) }, &config, "test").await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn retry_succeeds_after_failures() {
        let config = RetryConfig {
            base_ms: 1,
            max_ms: 5,
            ..RetryConfig::default()
        };
        let attempts = AtomicU32::new(0);

        let result = retry_with_backoff(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {n}"))
                } else {
                    Ok(n)
                }
            },
            &config,
            "test",
        )
        .await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn retry_fails_after_max_attempts() {
        let config = RetryConfig {
            max_attempts: 2,
            base_ms: 1,
            max_ms: 2,
        };

        let result =
            retry_with_backoff(|| async { Err::<i32, _>("persistent") }, &config, "test").await;

        assert_eq!(result, Err("persistent"));
    }
}
