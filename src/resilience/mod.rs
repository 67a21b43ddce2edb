pub mod circuit_breaker;

pub use circuit_breaker::{BreakerConfig, CircuitBreaker};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;

/// A circuit breaker plus an optional per-call timeout, composed around
/// every call to one backing store. Two instances exist process-wide:
/// `counter-store` (short recovery, timeout handled inside the adapter)
/// and `config-store` (longer recovery, 500 ms timeout here).
#[derive(Clone)]
pub struct StoreGuard {
    breaker: Arc<CircuitBreaker>,
    call_timeout: Option<Duration>,
}

impl StoreGuard {
    pub fn new(breaker: Arc<CircuitBreaker>, call_timeout: Option<Duration>) -> Self {
        Self {
            breaker,
            call_timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run one store operation under the breaker. Transport-class failures
    /// (including the timeout) feed the breaker; semantic errors count as
    /// successes — the store answered, the request was just wrong.
    pub async fn run<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        self.breaker.try_acquire()?;

        let result = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, op).await {
                Ok(r) => r,
                Err(_) => Err(ApiError::StoreUnavailable(format!(
                    "{} call exceeded {}ms",
                    self.breaker.name(),
                    limit.as_millis()
                ))),
            },
            None => op.await,
        };

        match &result {
            Err(e) if e.is_breaker_failure() => self.breaker.record_failure(),
            _ => self.breaker.record_success(),
        }

        result
    }
}

/// Fixed-backoff retry for counter-store transport failures. Semantic
/// errors and open circuits return immediately; the last transport error
/// is surfaced after the attempts are exhausted.
pub async fn with_retry<T, F, Fut>(
    attempts: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(
                    "counter call failed (attempt {}/{}): {}",
                    attempt,
                    attempts,
                    e
                );
                tokio::time::sleep(backoff).await;
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
    async fn retry_recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ApiError::StoreUnavailable("flaky".into()))
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
    async fn retry_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::StoreUnavailable("down".into())) }
        })
        .await;

        assert!(matches!(result, Err(ApiError::StoreUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn circuit_open_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::CircuitOpen("counter-store")) }
        })
        .await;

        assert!(matches!(result, Err(ApiError::CircuitOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn guard_opens_after_repeated_transport_failures() {
        let breaker = Arc::new(CircuitBreaker::new(
            "config-store",
            BreakerConfig {
                open_duration: Duration::from_secs(60),
                ..BreakerConfig::default()
            },
        ));
        let guard = StoreGuard::new(breaker, None);

        for _ in 0..5 {
            let _: Result<(), _> = guard
                .run(async { Err(ApiError::StoreUnavailable("down".into())) })
                .await;
        }

        let result: Result<(), _> = guard.run(async { Ok(()) }).await;
        assert!(matches!(result, Err(ApiError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn semantic_errors_do_not_trip_the_guard() {
        let breaker = Arc::new(CircuitBreaker::new("config-store", BreakerConfig::default()));
        let guard = StoreGuard::new(breaker, None);

        for _ in 0..10 {
            let _: Result<(), _> = guard
                .run(async { Err(ApiError::NotFound("policy".into())) })
                .await;
        }

        let result = guard.run(async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn guard_timeout_counts_as_failure() {
        let breaker = Arc::new(CircuitBreaker::new(
            "config-store",
            BreakerConfig {
                minimum_calls: 1,
                window_size: 1,
                open_duration: Duration::from_secs(60),
                ..BreakerConfig::default()
            },
        ));
        let guard = StoreGuard::new(breaker.clone(), Some(Duration::from_millis(5)));

        let result: Result<(), _> = guard
            .run(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ApiError::StoreUnavailable(_))));
        assert!(breaker.is_open());
    }
}
