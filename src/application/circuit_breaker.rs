//! Circuit breaker guarding the dedupe store.
//!
//! When the dedupe store keeps failing (Redis down, network partition), every
//! request would otherwise pay for a failed round trip before failing open
//! anyway. The breaker trips after a run of consecutive failures and skips
//! the store entirely until a recovery timeout has passed; then a single
//! trial call decides whether to close again.
//!
//! While the breaker is open the dedupe gate suppresses nothing, so events
//! keep being logged.

use crate::application::ports::Clock;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Whether the dedupe store is currently consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Store is healthy and consulted on every check
    Closed,
    /// Store is failing and skipped
    Open,
    /// Recovery timeout passed, the next call is a trial
    HalfOpen,
}

impl CircuitState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Tripping and recovery thresholds.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive store failures that open the circuit
    pub failure_threshold: u32,
    /// How long the store is skipped before a trial call
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Lock-free circuit breaker driven by the injected [`Clock`].
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    failures: AtomicU64,
    /// Unix milliseconds of the most recent failure
    tripped_at_ms: AtomicI64,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(CircuitBreakerConfig::default(), clock)
    }

    pub fn with_config(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            failures: AtomicU64::new(0),
            tripped_at_ms: AtomicI64::new(0),
            config,
            clock,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: CircuitState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn recovery_due(&self) -> bool {
        let elapsed_ms = self
            .clock
            .now()
            .timestamp_millis()
            .saturating_sub(self.tripped_at_ms.load(Ordering::Acquire));
        let timeout_ms = i64::try_from(self.config.recovery_timeout.as_millis()).unwrap_or(i64::MAX);

        // Negative when the clock stepped backwards
        elapsed_ms >= timeout_ms
    }

    /// Whether the protected store should be called now.
    ///
    /// Returns `false` while the circuit is open; the caller then treats the
    /// event as not suppressed.
    pub fn allow_request(&self) -> bool {
        if self.state() != CircuitState::Open {
            return true;
        }
        if !self.recovery_due() {
            return false;
        }

        // Racing callers all get through once one has moved it to HalfOpen
        self.state
            .compare_exchange(
                CircuitState::Open as u8,
                CircuitState::HalfOpen as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
            || self.state() == CircuitState::HalfOpen
    }

    pub fn record_success(&self) {
        if self.state() == CircuitState::Open {
            return;
        }
        self.failures.store(0, Ordering::Release);
        self.set_state(CircuitState::Closed);
    }

    pub fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        self.tripped_at_ms
            .store(self.clock.now().timestamp_millis(), Ordering::Release);

        let trips = match self.state() {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => failures >= u64::from(self.config.failure_threshold),
            CircuitState::Open => false,
        };
        if trips {
            self.set_state(CircuitState::Open);
        }
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    /// Force the circuit closed.
    pub fn reset(&self) {
        self.failures.store(0, Ordering::Release);
        self.set_state(CircuitState::Closed);
    }
}
