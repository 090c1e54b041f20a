//! Lazy retention pruning.
//!
//! There is no background timer. Admin traffic calls
//! [`MaintenanceScheduler::maybe_run_cleanup`], which prunes at most once per
//! [`CLEANUP_INTERVAL_SECS`].

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, EventStore, OptionStore, StoreError};
use crate::application::settings::SettingsService;
use std::sync::Arc;

/// Option name of the last successful run, as unix seconds.
pub const LAST_RUN_OPTION: &str = "maintenance_last_run";

/// Minimum time between two pruning runs (12 hours).
pub const CLEANUP_INTERVAL_SECS: i64 = 12 * 60 * 60;

/// Result of a maintenance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The last run is recent enough
    Skipped,
    /// Pruning ran and removed `deleted` events
    Ran { deleted: usize },
}

/// Decides when to prune and prunes.
#[derive(Debug, Clone)]
pub struct MaintenanceScheduler {
    events: Arc<dyn EventStore>,
    options: Arc<dyn OptionStore>,
    settings: Arc<SettingsService>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl MaintenanceScheduler {
    pub fn new(
        events: Arc<dyn EventStore>,
        options: Arc<dyn OptionStore>,
        settings: Arc<SettingsService>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Self {
        Self {
            events,
            options,
            settings,
            clock,
            metrics,
        }
    }

    /// Prune events older than the retention window, unless a run
    /// succeeded within the last [`CLEANUP_INTERVAL_SECS`].
    ///
    /// The last-run timestamp is only written after a successful delete.
    /// Concurrent callers may both prune; deleting twice is harmless.
    pub fn maybe_run_cleanup(&self) -> Result<CleanupOutcome, StoreError> {
        let now = self.clock.now();
        let last_run = self.last_run()?;

        if last_run > 0 && now.timestamp() - last_run < CLEANUP_INTERVAL_SECS {
            return Ok(CleanupOutcome::Skipped);
        }

        let retention = self.settings.load().retention();
        let cutoff = now - retention;
        let deleted = self.events.delete_older_than(cutoff)?;

        self.options
            .set(LAST_RUN_OPTION, &now.timestamp().to_string())?;
        self.metrics.record_cleanup(deleted);

        tracing::info!(deleted, cutoff = %cutoff, "Pruned expired events");
        Ok(CleanupOutcome::Ran { deleted })
    }

    /// Forget the last run and prune right away.
    pub fn force_cleanup(&self) -> Result<CleanupOutcome, StoreError> {
        self.options.set(LAST_RUN_OPTION, "0")?;
        self.maybe_run_cleanup()
    }

    /// Unix seconds of the last successful run; 0 if it never ran.
    ///
    /// An unparseable stored value counts as never.
    pub fn last_run(&self) -> Result<i64, StoreError> {
        let raw = self.options.get(LAST_RUN_OPTION)?;
        Ok(raw
            .and_then(|value| value.trim().parse::<i64>().ok())
            .unwrap_or(0))
    }
}
