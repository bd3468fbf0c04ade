// Path: crates/node/src/retry.rs
//! Exponential backoff with jitter for transient failures.
//!
//! Boundaries (connectors, transport) retry through this helper; safety and
//! integrity failures are never retried.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use veil_types::config::RetryConfig;
use veil_types::error::TransientError;

fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config
        .base_backoff_ms
        .saturating_mul(1u64 << attempt.min(20));
    let capped = exp.min(config.backoff_cap_ms);
    let jitter = rand::thread_rng().gen_range(0..=capped / 2);
    Duration::from_millis(capped + jitter)
}

/// Runs `op` until it succeeds or the attempt budget is spent.
pub async fn retry_transient<T, F, Fut>(
    config: &RetryConfig,
    op_name: &str,
    mut op: F,
) -> Result<T, TransientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransientError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 >= config.max_attempts => {
                warn!(op = op_name, attempts = attempt + 1, error = %e, "retries exhausted");
                return Err(e);
            }
            Err(e) => {
                let delay = backoff_delay(config, attempt);
                warn!(
                    op = op_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_backoff_ms: 1,
            backoff_cap_ms: 4,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);
        let result = retry_transient(&fast_config(5), "test", move || {
            let calls = Arc::clone(&calls_in);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TransientError::ServiceUnavailable("warming up".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_the_error_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);
        let result: Result<(), _> = retry_transient(&fast_config(3), "test", move || {
            let calls = Arc::clone(&calls_in);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransientError::Timeout("still down".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_is_capped_at_the_configured_ceiling() {
        let config = RetryConfig {
            max_attempts: 10,
            base_backoff_ms: 100_000,
            backoff_cap_ms: 300_000,
        };
        for attempt in 0..10 {
            let d = backoff_delay(&config, attempt);
            assert!(d.as_millis() <= 450_000);
        }
    }
}
