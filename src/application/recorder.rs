//! Deferred event recording.
//!
//! Once the hosting framework has settled the response, the captured
//! snapshot is classified, passed through the dedupe gate and written.

use crate::application::dedupe::DedupeGate;
use crate::application::metrics::Metrics;
use crate::application::ports::EventStore;
use crate::domain::classify::classify;
use crate::domain::event::Event;
use crate::domain::request::{PendingCapture, ResponseOutcome};
use std::fmt;
use std::sync::Arc;

/// What happened to a captured request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Written with the given id
    Recorded(i64),
    /// Matched no classification rule
    Unclassified,
    /// Dropped as a repeat within the dedupe window
    Suppressed,
    /// The store rejected the write; the event is lost
    WriteFailed,
}

impl RecordOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded(_))
    }
}

/// Turns pending captures into stored events.
#[derive(Clone)]
pub struct EventRecorder {
    events: Arc<dyn EventStore>,
    gate: DedupeGate,
    metrics: Metrics,
}

impl fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecorder")
            .field("events", &self.events)
            .field("gate", &self.gate)
            .finish()
    }
}

impl EventRecorder {
    pub fn new(events: Arc<dyn EventStore>, gate: DedupeGate, metrics: Metrics) -> Self {
        Self {
            events,
            gate,
            metrics,
        }
    }

    /// Classify and, unless suppressed, persist the captured request.
    ///
    /// Dedupe follows the settings captured with the request, not the
    /// settings current at flush time. Write failures are logged and
    /// counted, never retried.
    pub fn finalize(&self, pending: PendingCapture, response: ResponseOutcome) -> RecordOutcome {
        let status = response.final_status();

        let Some(classification) = classify(status, &pending.path, &pending.user_agent) else {
            self.metrics.record_unclassified();
            return RecordOutcome::Unclassified;
        };

        let settings = pending.settings;
        if settings.enable_dedupe
            && self
                .gate
                .should_suppress(classification, &pending, settings.dedupe_window())
        {
            return RecordOutcome::Suppressed;
        }

        let event = Event::new(
            classification,
            pending.captured_at,
            pending.ip,
            pending.user_agent,
            pending.path,
            status,
        );

        match self.events.insert(&event) {
            Ok(id) => {
                self.metrics.record_recorded();
                tracing::debug!(
                    id,
                    category = %event.category,
                    subtype = %event.subtype,
                    status,
                    "Recorded event"
                );
                RecordOutcome::Recorded(id)
            }
            Err(e) => {
                self.metrics.record_write_failure();
                tracing::warn!(
                    error = %e,
                    category = %event.category,
                    subtype = %event.subtype,
                    path = %event.path,
                    "Failed to record event"
                );
                RecordOutcome::WriteFailed
            }
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
