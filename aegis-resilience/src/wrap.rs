//! Composes retry + circuit breaker + rate limiter around a protected async
//! operation. Every outbound call site (LLM generation, audit writes, vector
//! store persistence) goes through one of these instead of hand-rolling the
//! combination.

use crate::breaker::CircuitBreaker;
use crate::limiter::TokenBucket;
use crate::retry::{retry, RetryPolicy};
use aegis_core::{AegisError, TransientError};
use std::future::Future;

/// Protects a fallible async operation with a rate limiter, circuit breaker,
/// and retry policy, in that order: wait for budget, check the breaker,
/// attempt with retry.
pub struct Protected<'a> {
    pub limiter: Option<&'a TokenBucket>,
    pub breaker: Option<&'a CircuitBreaker>,
    pub retry_policy: RetryPolicy,
}

impl<'a> Protected<'a> {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            limiter: None,
            breaker: None,
            retry_policy,
        }
    }

    pub fn with_limiter(mut self, limiter: &'a TokenBucket) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_breaker(mut self, breaker: &'a CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub async fn call<T, F, Fut, R>(&self, is_retryable: R, mut op: F) -> Result<T, AegisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransientError>>,
        R: Fn(&TransientError) -> bool,
    {
        if let Some(limiter) = self.limiter {
            limiter.wait(1.0).await;
        }
        if let Some(breaker) = self.breaker {
            let admission = breaker.admit()?;
            let result = retry(&self.retry_policy, &is_retryable, &mut op).await;
            match &result {
                Ok(_) => admission.success(),
                Err(_) => admission.failure(),
            }
            result
        } else {
            retry(&self.retry_policy, &is_retryable, &mut op).await
        }
    }
}
