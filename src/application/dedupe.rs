//! Dedupe gate.
//!
//! The gate decides whether a classified event repeats one seen within the
//! dedupe window and should therefore not be written again.

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::metrics::Metrics;
use crate::application::ports::{DedupeStore, StoreError};
use crate::domain::classify::Classification;
use crate::domain::request::PendingCapture;
use crate::domain::signature::DedupeKey;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Suppresses repeated events using an expiring key set.
#[derive(Clone)]
pub struct DedupeGate {
    store: Arc<dyn DedupeStore>,
    metrics: Metrics,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl fmt::Debug for DedupeGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupeGate")
            .field("store", &self.store)
            .field("circuit_state", &self.circuit_breaker.state())
            .finish()
    }
}

impl DedupeGate {
    pub fn new(
        store: Arc<dyn DedupeStore>,
        metrics: Metrics,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            store,
            metrics,
            circuit_breaker,
        }
    }

    /// Decide whether the event described by `classification` and
    /// `snapshot` should be dropped as a repeat.
    ///
    /// The first occurrence of a key marks it for `ttl`; later occurrences
    /// inside that window are suppressed.
    ///
    /// # Fail-Open Behavior
    /// If the store errors, or the circuit breaker is open, the event is
    /// not suppressed. Logging a duplicate is preferable to losing an event.
    pub fn should_suppress(
        &self,
        classification: Classification,
        snapshot: &PendingCapture,
        ttl: Duration,
    ) -> bool {
        if !self.circuit_breaker.allow_request() {
            return false;
        }

        let key = DedupeKey::new(
            classification.category(),
            classification.subtype(),
            &snapshot.ip,
            &snapshot.path,
            &snapshot.user_agent,
        );

        match self.check_and_mark(&key, ttl) {
            Ok(suppress) => {
                self.circuit_breaker.record_success();
                if suppress {
                    self.metrics.record_suppressed();
                    tracing::debug!(key = %key, subtype = classification.subtype(), "Suppressed repeated event");
                }
                suppress
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                self.metrics.record_dedupe_failure();
                tracing::warn!(key = %key, error = %e, "Dedupe store failed, logging event anyway");
                false
            }
        }
    }

    fn check_and_mark(&self, key: &DedupeKey, ttl: Duration) -> Result<bool, StoreError> {
        // Check-then-set is not atomic; two concurrent identical requests
        // may both pass.
        if self.store.exists(key)? {
            return Ok(true);
        }
        self.store.set_with_ttl(key, ttl)?;
        Ok(false)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }
}
