//! The `BotInsight` facade wired for a hosting framework.
//!
//! The hosting framework calls [`BotInsight::capture`] early in each
//! request and [`BotInsight::finalize`] once the response is settled. The
//! admin surface calls the settings, query and maintenance operations.

use crate::application::capture::RequestCapture;
use crate::application::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::application::dedupe::DedupeGate;
use crate::application::maintenance::{CleanupOutcome, MaintenanceScheduler};
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, DedupeStore, EventStore, OptionStore, StoreError};
use crate::application::recorder::{EventRecorder, RecordOutcome};
use crate::application::settings::SettingsService;
use crate::domain::event::{EventFilter, InsightSummary, StoredEvent};
use crate::domain::request::{PendingCapture, RequestParts, ResponseOutcome};
use crate::domain::settings::{RawSettings, Settings};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::sqlite::SqliteStore;
use crate::infrastructure::storage::{ShardedTtlStore, DEFAULT_MAX_KEYS};
use std::path::Path;
use std::sync::Arc;

/// Error returned when building a [`BotInsight`] fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// No event store was configured
    MissingEventStore,
    /// No option store was configured
    MissingOptionStore,
    /// Circuit breaker failure threshold must be greater than zero
    ZeroFailureThreshold,
    /// In-process dedupe store capacity must be greater than zero
    ZeroMaxDedupeKeys,
    /// Opening the default storage failed
    Storage(StoreError),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::MissingEventStore => write!(f, "an event store must be configured"),
            BuildError::MissingOptionStore => write!(f, "an option store must be configured"),
            BuildError::ZeroFailureThreshold => {
                write!(f, "circuit breaker failure_threshold must be greater than 0")
            }
            BuildError::ZeroMaxDedupeKeys => {
                write!(f, "max_dedupe_keys must be greater than 0")
            }
            BuildError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<StoreError> for BuildError {
    fn from(e: StoreError) -> Self {
        BuildError::Storage(e)
    }
}

/// Builder for constructing a [`BotInsight`].
pub struct BotInsightBuilder {
    clock: Option<Arc<dyn Clock>>,
    event_store: Option<Arc<dyn EventStore>>,
    option_store: Option<Arc<dyn OptionStore>>,
    dedupe_store: Option<Arc<dyn DedupeStore>>,
    circuit_breaker_config: CircuitBreakerConfig,
    max_dedupe_keys: usize,
}

impl BotInsightBuilder {
    /// Set the clock (default: [`SystemClock`]).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn with_option_store(mut self, store: Arc<dyn OptionStore>) -> Self {
        self.option_store = Some(store);
        self
    }

    /// Use one SQLite database for both events and options.
    pub fn with_sqlite(self, store: SqliteStore) -> Self {
        let store = Arc::new(store);
        self.with_event_store(store.clone()).with_option_store(store)
    }

    /// Set the dedupe store (default: an in-process [`ShardedTtlStore`]).
    ///
    /// Use a shared store such as Redis when several processes serve the
    /// same site.
    pub fn with_dedupe_store(mut self, store: Arc<dyn DedupeStore>) -> Self {
        self.dedupe_store = Some(store);
        self
    }

    pub fn with_circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker_config = config;
        self
    }

    /// Bound the default in-process dedupe store (default: 100,000 keys).
    ///
    /// Ignored when a dedupe store is set explicitly.
    pub fn with_max_dedupe_keys(mut self, max_keys: usize) -> Self {
        self.max_dedupe_keys = max_keys;
        self
    }

    /// Build the facade.
    ///
    /// # Errors
    /// Returns `BuildError` if a store is missing or the configuration is
    /// invalid.
    pub fn build(self) -> Result<BotInsight, BuildError> {
        if self.circuit_breaker_config.failure_threshold == 0 {
            return Err(BuildError::ZeroFailureThreshold);
        }
        if self.max_dedupe_keys == 0 {
            return Err(BuildError::ZeroMaxDedupeKeys);
        }
        let events = self.event_store.ok_or(BuildError::MissingEventStore)?;
        let options = self.option_store.ok_or(BuildError::MissingOptionStore)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let dedupe_store = self.dedupe_store.unwrap_or_else(|| {
            Arc::new(ShardedTtlStore::with_capacity(
                Arc::clone(&clock),
                self.max_dedupe_keys,
            ))
        });

        let metrics = Metrics::new();
        let circuit_breaker = Arc::new(CircuitBreaker::with_config(
            self.circuit_breaker_config,
            Arc::clone(&clock),
        ));
        let settings = Arc::new(SettingsService::new(Arc::clone(&options)));

        let gate = DedupeGate::new(dedupe_store, metrics.clone(), Arc::clone(&circuit_breaker));
        let recorder = EventRecorder::new(Arc::clone(&events), gate, metrics.clone());
        let maintenance = MaintenanceScheduler::new(
            Arc::clone(&events),
            options,
            Arc::clone(&settings),
            Arc::clone(&clock),
            metrics.clone(),
        );

        Ok(BotInsight {
            clock,
            events,
            settings,
            recorder,
            maintenance,
            metrics,
            circuit_breaker,
        })
    }
}

/// Request classification and event logging for one site.
///
/// Cheap to clone; clones share stores and metrics.
#[derive(Debug, Clone)]
pub struct BotInsight {
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventStore>,
    settings: Arc<SettingsService>,
    recorder: EventRecorder,
    maintenance: MaintenanceScheduler,
    metrics: Metrics,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl BotInsight {
    /// Create a builder for configuring the facade.
    ///
    /// Defaults:
    /// - Clock: system clock
    /// - Dedupe store: in-process, 100,000 keys
    /// - Circuit breaker: 5 failures, 30 second recovery
    pub fn builder() -> BotInsightBuilder {
        BotInsightBuilder {
            clock: None,
            event_store: None,
            option_store: None,
            dedupe_store: None,
            circuit_breaker_config: CircuitBreakerConfig::default(),
            max_dedupe_keys: DEFAULT_MAX_KEYS,
        }
    }

    /// Facade over an on-disk SQLite database, with defaults otherwise.
    pub fn open_sqlite<P: AsRef<Path>>(path: P) -> Result<Self, BuildError> {
        Self::builder().with_sqlite(SqliteStore::open(path)?).build()
    }

    /// Facade over a private in-memory SQLite database.
    pub fn open_in_memory() -> Result<Self, BuildError> {
        Self::builder()
            .with_sqlite(SqliteStore::open_in_memory()?)
            .build()
    }

    /// Snapshot a request early in its lifecycle.
    ///
    /// Returns `None` when the request is not visitor traffic or lacks a
    /// user-agent or client IP. The snapshot carries the current settings.
    pub fn capture(&self, request: &RequestParts) -> Option<PendingCapture> {
        let settings = self.settings.load();
        RequestCapture::capture(request, &settings, self.clock.now())
    }

    /// Classify, dedupe and store a captured request.
    pub fn finalize(&self, pending: PendingCapture, response: ResponseOutcome) -> RecordOutcome {
        self.recorder.finalize(pending, response)
    }

    /// Like [`finalize`](Self::finalize), on tokio's blocking pool.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    #[cfg(feature = "async")]
    pub fn finalize_detached(
        &self,
        pending: PendingCapture,
        response: ResponseOutcome,
    ) -> tokio::task::JoinHandle<RecordOutcome> {
        let recorder = self.recorder.clone();
        tokio::task::spawn_blocking(move || recorder.finalize(pending, response))
    }

    /// Prune expired events unless that already happened recently.
    pub fn maybe_run_cleanup(&self) -> Result<CleanupOutcome, StoreError> {
        self.maintenance.maybe_run_cleanup()
    }

    /// Prune expired events now.
    pub fn force_cleanup(&self) -> Result<CleanupOutcome, StoreError> {
        self.maintenance.force_cleanup()
    }

    /// Delete every stored event.
    pub fn purge_all(&self) -> Result<(), StoreError> {
        self.events.truncate_all()?;
        tracing::info!("Purged all events");
        Ok(())
    }

    /// Merge and persist admin-submitted settings.
    pub fn save_settings(&self, raw: &RawSettings) -> Result<Settings, StoreError> {
        self.settings.save(raw)
    }

    /// Current settings.
    pub fn settings(&self) -> Settings {
        self.settings.load()
    }

    /// Events matching `filter`, newest first.
    ///
    /// `limit` defaults to the configured page size.
    pub fn query(
        &self,
        filter: &EventFilter,
        limit: Option<usize>,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let limit = limit.unwrap_or_else(|| self.settings.load().per_page as usize);
        self.events.query(filter, limit)
    }

    /// Per-category and per-crawler counts.
    pub fn summary(&self) -> Result<InsightSummary, StoreError> {
        Ok(InsightSummary {
            by_category: self.events.count_by_category()?,
            search_by_subtype: self.events.count_search_by_subtype()?,
        })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }
}
