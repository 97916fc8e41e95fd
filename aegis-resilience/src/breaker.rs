//! Three-state circuit breaker (spec §4.1).

use aegis_core::{AegisError, CircuitOpenError};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BreakerState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for BreakerState {
    fn from(v: u8) -> Self {
        match v {
            0 => BreakerState::Closed,
            1 => BreakerState::Open,
            _ => BreakerState::HalfOpen,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub half_open_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_probes: 2,
        }
    }
}

/// Per-endpoint circuit breaker. `Closed -> Open` on `failure_threshold`
/// consecutive failures; `Open -> HalfOpen` after `reset_timeout`;
/// `HalfOpen -> Closed` after `half_open_probes` consecutive successes;
/// any half-open failure returns to `Open` and resets the cooldown clock.
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    failure_count: AtomicU32,
    half_open_successes: AtomicU32,
    half_open_inflight: AtomicU32,
    opened_at_millis: std::sync::atomic::AtomicU64,
    trip_count: AtomicU64,
    start: Instant,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: AtomicU8::new(BreakerState::Closed as u8),
            failure_count: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            half_open_inflight: AtomicU32::new(0),
            opened_at_millis: std::sync::atomic::AtomicU64::new(0),
            trip_count: AtomicU64::new(0),
            start: Instant::now(),
            config,
        }
    }

    pub fn state(&self) -> BreakerState {
        BreakerState::from(self.state.load(Ordering::SeqCst))
    }

    /// Number of times this breaker has transitioned into `Open`.
    pub fn trip_count(&self) -> u64 {
        self.trip_count.load(Ordering::SeqCst)
    }

    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Called immediately before invoking the protected operation. Returns
    /// `Err(CircuitOpen)` without running the operation if the circuit is
    /// open and the reset timeout hasn't elapsed, or if half-open admission
    /// is already saturated.
    pub fn admit(&self) -> Result<BreakerAdmission<'_>, AegisError> {
        loop {
            match self.state() {
                BreakerState::Closed => return Ok(BreakerAdmission { breaker: self, was_half_open: false }),
                BreakerState::Open => {
                    let opened_at = self.opened_at_millis.load(Ordering::SeqCst);
                    let elapsed = self.now_millis().saturating_sub(opened_at);
                    if elapsed >= self.config.reset_timeout.as_millis() as u64 {
                        // Transition to half-open; loop to retry admission there.
                        let _ = self.state.compare_exchange(
                            BreakerState::Open as u8,
                            BreakerState::HalfOpen as u8,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        );
                        self.half_open_successes.store(0, Ordering::SeqCst);
                        self.half_open_inflight.store(0, Ordering::SeqCst);
                        continue;
                    }
                    return Err(AegisError::CircuitOpen(CircuitOpenError {
                        endpoint: self.name.clone(),
                    }));
                }
                BreakerState::HalfOpen => {
                    let inflight = self.half_open_inflight.fetch_add(1, Ordering::SeqCst) + 1;
                    if inflight > self.config.half_open_probes {
                        self.half_open_inflight.fetch_sub(1, Ordering::SeqCst);
                        return Err(AegisError::CircuitOpen(CircuitOpenError {
                            endpoint: self.name.clone(),
                        }));
                    }
                    return Ok(BreakerAdmission { breaker: self, was_half_open: true });
                }
            }
        }
    }

    fn record_success(&self, was_half_open: bool) {
        if was_half_open {
            self.half_open_inflight.fetch_sub(1, Ordering::SeqCst);
            let successes = self.half_open_successes.fetch_add(1, Ordering::SeqCst) + 1;
            if successes >= self.config.half_open_probes {
                self.state.store(BreakerState::Closed as u8, Ordering::SeqCst);
                self.failure_count.store(0, Ordering::SeqCst);
            }
        } else {
            self.failure_count.store(0, Ordering::SeqCst);
        }
    }

    fn record_failure(&self, was_half_open: bool) {
        if was_half_open {
            self.half_open_inflight.fetch_sub(1, Ordering::SeqCst);
            self.opened_at_millis.store(self.now_millis(), Ordering::SeqCst);
            self.state.store(BreakerState::Open as u8, Ordering::SeqCst);
            self.failure_count.store(0, Ordering::SeqCst);
            self.trip_count.fetch_add(1, Ordering::SeqCst);
            return;
        }
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.config.failure_threshold {
            self.opened_at_millis.store(self.now_millis(), Ordering::SeqCst);
            self.state.store(BreakerState::Open as u8, Ordering::SeqCst);
            self.trip_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Proof that a call was admitted; must be resolved with `success()` or
/// `failure()` so the breaker's state machine stays correct.
pub struct BreakerAdmission<'a> {
    breaker: &'a CircuitBreaker,
    was_half_open: bool,
}

impl BreakerAdmission<'_> {
    pub fn success(self) {
        self.breaker.record_success(self.was_half_open);
    }

    pub fn failure(self) {
        self.breaker.record_failure(self.was_half_open);
    }
}
