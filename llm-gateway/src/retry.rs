//! Bounded exponential backoff for idempotent provider calls.
//!
//! Only transient failures (timeouts, rate limits, 5xx, transport) are
//! retried; everything else surfaces immediately. The delay doubles from
//! 500 ms, honoring a provider-supplied `Retry-After` when present.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::{LlmError, LlmResult};

const INITIAL_BACKOFF_MS: u64 = 500;

/// Runs `op` up to `max_attempts` times, sleeping between transient failures.
pub async fn retry_with_backoff<T, F, Fut>(
    op_name: &str,
    max_attempts: u32,
    mut op: F,
) -> LlmResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LlmResult<T>>,
{
    let mut delay = Duration::from_millis(INITIAL_BACKOFF_MS);
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let sleep_for = match &e {
                    LlmError::RateLimited {
                        retry_after_secs: Some(secs),
                    } => Duration::from_secs(*secs),
                    _ => delay,
                };
                warn!(
                    op = op_name,
                    attempt,
                    max_attempts,
                    delay_ms = sleep_for.as_millis() as u64,
                    error = %e,
                    "transient failure, backing off"
                );
                tokio::time::sleep(sleep_for).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let out = retry_with_backoff("test", 3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::Timeout)
                } else {
                    Ok(42u32)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let out: LlmResult<u32> = retry_with_backoff("test", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Unauthorized) }
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
