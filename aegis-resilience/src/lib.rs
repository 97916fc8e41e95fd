//! Resilience primitives shared by every outbound call in the agent core:
//! retry with jitter, a three-state circuit breaker, token-bucket and
//! sliding-window rate limiters, and a health probe registry (spec §4.1).

mod breaker;
mod health_registry;
mod limiter;
mod retry;
mod wrap;

pub use breaker::{BreakerAdmission, BreakerConfig, BreakerState, CircuitBreaker};
pub use health_registry::{run_on_interval, HealthRegistry, Probe};
pub use limiter::{KeyedSlidingWindow, SlidingWindow, TokenBucket};
pub use retry::{retry, RetryPolicy};
pub use wrap::Protected;
