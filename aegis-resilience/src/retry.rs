//! Retry with jittered exponential backoff (spec §4.1).

use aegis_core::{AegisError, RetryExhaustedError, TransientError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::instrument;

/// Policy governing how a retryable operation is attempted.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the computed delay to jitter by, e.g. `0.1` for ±10%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `n` (0-indexed retry count, i.e. after the first
    /// failure `n == 0`).
    pub fn delay_for_attempt(&self, n: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(n as i32);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);
        let jitter_fraction = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        let jittered_ms = (capped_ms * (1.0 + jitter_fraction)).max(0.0);
        Duration::from_millis(jittered_ms as u64)
    }
}

/// Run `op` under `policy`, retrying transient failures until `is_retryable`
/// returns false or attempts are exhausted. Fails with `RetryExhausted`
/// wrapping the last error, per spec §4.1.
#[instrument(skip_all, fields(max_attempts = policy.max_attempts))]
pub async fn retry<T, F, Fut, R>(
    policy: &RetryPolicy,
    is_retryable: R,
    mut op: F,
) -> Result<T, AegisError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransientError>>,
    R: Fn(&TransientError) -> bool,
{
    let mut last_error: Option<TransientError> = None;
    for attempt in 0..policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(AegisError::Transient(err));
                }
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                }
                last_error = Some(err);
            }
        }
    }
    Err(AegisError::RetryExhausted(RetryExhaustedError {
        attempts: policy.max_attempts,
        last_error: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let policy = RetryPolicy::default();
        let result: Result<u32, AegisError> =
            retry(&policy, |_| true, || async { Ok::<u32, TransientError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 1.0,
            jitter: 0.0,
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), AegisError> = retry(
            &policy,
            |_| true,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TransientError {
                        operation: "test".to_string(),
                        reason: "boom".to_string(),
                    })
                }
            },
        )
        .await;
        assert!(matches!(result, Err(AegisError::RetryExhausted(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_immediately_when_not_retryable() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), AegisError> = retry(
            &policy,
            |_| false,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TransientError {
                        operation: "test".to_string(),
                        reason: "permanent".to_string(),
                    })
                }
            },
        )
        .await;
        assert!(matches!(result, Err(AegisError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_never_exceeds_max() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 3.0,
            jitter: 0.5,
        };
        for n in 0..10 {
            let d = policy.delay_for_attempt(n);
            assert!(d <= Duration::from_millis(750), "delay {:?} too large at n={}", d, n);
        }
    }

    proptest! {
        // No jitter fraction can push the delay past `max_delay * (1 +
        // jitter)`, for any attempt count or policy in a realistic range.
        #[test]
        fn delay_for_attempt_never_exceeds_jittered_max(
            initial_ms in 1u64..1_000,
            max_ms in 1u64..10_000,
            multiplier in 1.0f64..4.0,
            jitter in 0.0f64..0.9,
            attempt in 0u32..20,
        ) {
            let policy = RetryPolicy {
                max_attempts: 10,
                initial_delay: Duration::from_millis(initial_ms),
                max_delay: Duration::from_millis(max_ms),
                multiplier,
                jitter,
            };
            let delay = policy.delay_for_attempt(attempt);
            let ceiling = Duration::from_millis((max_ms as f64 * (1.0 + jitter)).ceil() as u64 + 1);
            prop_assert!(delay <= ceiling, "delay {:?} exceeded ceiling {:?}", delay, ceiling);
        }
    }
}
