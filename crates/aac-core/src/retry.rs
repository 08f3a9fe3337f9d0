//! Bounded exponential-backoff retry wrapper for async calls.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::errors::EngineError;

/// Executes `f` up to `retries + 1` times. Between retryable failures it
/// sleeps `(2^attempt) * base_delay + U(0, 0.25s)`. A `retryable` predicate decides
/// whether a given error is worth retrying; non-retryable errors propagate
/// immediately. Exhaustion raises `EngineError::RetryExceeded` wrapping the
/// last cause's message.
pub async fn with_backoff<T, E, F, Fut, R>(retries: u32, base_delay: Duration, mut retryable: R, mut f: F) -> Result<T, EngineError>
    where F: FnMut() -> Fut,
          Fut: Future<Output = Result<T, E>>,
          R: FnMut(&E) -> bool,
          E: std::fmt::Display
{
    let mut last_error: Option<String> = None;

    for attempt in 0..=retries {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let message = err.to_string();
                let is_retryable = retryable(&err);
                last_error = Some(message.clone());

                if !is_retryable {
                    return Err(EngineError::ProviderFailure(message));
                }
                if attempt >= retries {
                    break;
                }

                let backoff = 2u64.saturating_pow(attempt) as f64 * base_delay.as_secs_f64();
                let jitter: f64 = rand::thread_rng().gen_range(0.0..0.25);
                tokio::time::sleep(Duration::from_secs_f64(backoff + jitter)).await;
            }
        }
    }

    Err(EngineError::RetryExceeded(last_error.unwrap_or_else(|| "unknown error".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, EngineError> = with_backoff(3, Duration::from_millis(1), |_: &&str| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<u32, &str>(42) }
        }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, EngineError> = with_backoff(3, Duration::from_millis(1), |_: &&str| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("transient") } else { Ok(7) } }
        }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retries_and_raises_retry_exceeded() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, EngineError> = with_backoff(2, Duration::from_millis(1), |_: &&str| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, &str>("always fails") }
        }).await;
        assert!(matches!(result, Err(EngineError::RetryExceeded(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, EngineError> = with_backoff(5, Duration::from_millis(1), |_: &&str| false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, &str>("fatal") }
        }).await;
        assert!(matches!(result, Err(EngineError::ProviderFailure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
