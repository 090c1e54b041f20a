//! # bot-insight
//!
//! Classify incoming web requests as known search-engine crawlers or
//! suspicious traffic, and keep a deduplicated, retention-pruned log of
//! those events for an admin surface to review.
//!
//! The hosting web framework drives the pipeline in two steps per request:
//! [`BotInsight::capture`] early on (client IP, user-agent, path), and
//! [`BotInsight::finalize`] once the response status is known. Unclassified
//! requests are never written; repeated events within the dedupe window are
//! suppressed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bot_insight::{BotInsight, EventFilter, RequestParts, ResponseOutcome};
//!
//! let insight = BotInsight::open_sqlite("/var/lib/site/bot-insight.db").unwrap();
//!
//! // Early in the request
//! let request = RequestParts::new("/wp-login.php?action=lostpassword")
//!     .with_peer_addr("203.0.113.50")
//!     .with_header("User-Agent", "Mozilla/5.0");
//! let pending = insight.capture(&request);
//!
//! // Once the response is settled
//! if let Some(pending) = pending {
//!     insight.finalize(pending, ResponseOutcome::with_status(200));
//! }
//!
//! // From the admin surface
//! insight.maybe_run_cleanup().unwrap();
//! let recent = insight.query(&EventFilter::all(), None).unwrap();
//! ```
//!
//! ## Classification
//!
//! A user-agent naming a known crawler (Googlebot, bingbot, Slurp,
//! YandexBot, DuckDuckBot) makes a `search` event, whatever the status.
//! Otherwise the risk rules apply in priority order:
//!
//! | Rule | Level | Tag |
//! |------|-------|-----|
//! | status >= 500 | high | `status_5xx` |
//! | status 444 or 520-526 | high | `status_edge` |
//! | path probes a sensitive location (`/.env`, `/wp-login.php`, ...) | high | `probe_path` |
//! | status 401, 403, 404 | mid | `status_4xx` |
//! | user-agent names a scanner (sqlmap, nikto, ...) | mid | `ua_tool` |
//!
//! ## Dedupe
//!
//! Events are keyed by category, subtype, client IP, path and the first 64
//! bytes of the user-agent. The first occurrence within `dedupe_ttl`
//! seconds is written; the rest are dropped. The key set lives in-process by
//! default, or in Redis with the `redis-storage` feature:
//!
//! ```rust,ignore
//! use bot_insight::{BotInsight, RedisDedupeStore, SqliteStore};
//! use std::sync::Arc;
//!
//! let store = RedisDedupeStore::connect("redis://127.0.0.1/").await?;
//! let insight = BotInsight::builder()
//!     .with_sqlite(SqliteStore::open("bot-insight.db")?)
//!     .with_dedupe_store(Arc::new(store))
//!     .build()?;
//! ```
//!
//! ## Fail-Safe Operation
//!
//! Dedupe store errors fail open: the event is written anyway. A circuit
//! breaker stops consulting a failing store until it recovers:
//!
//! ```rust,no_run
//! # use bot_insight::{BotInsight, CircuitState};
//! # let insight = BotInsight::open_in_memory().unwrap();
//! match insight.circuit_breaker().state() {
//!     CircuitState::Closed => println!("Normal operation"),
//!     CircuitState::Open => println!("Dedupe store skipped - logging every event"),
//!     CircuitState::HalfOpen => println!("Testing recovery"),
//! }
//! ```
//!
//! Event write failures are logged at `warn` and counted in
//! [`Metrics::write_failures`]; they are never retried.
//!
//! ## Retention
//!
//! There is no background thread. [`BotInsight::maybe_run_cleanup`] deletes
//! events older than `days_keep` days at most once every 12 hours and is
//! meant to be called from admin page loads. [`BotInsight::force_cleanup`]
//! runs it unconditionally.
//!
//! ## Settings
//!
//! | Setting | Default | Range |
//! |---------|---------|-------|
//! | `trust_proxy` | false | honour `CF-Connecting-IP`, then `X-Forwarded-For` |
//! | `days_keep` | 30 | 7..=365 |
//! | `per_page` | 200 | 100, 200, 500 or 1000 |
//! | `dedupe_ttl` | 60 | 10..=600 seconds |
//! | `enable_dedupe` | true | |
//!
//! Out-of-range values are clamped, never rejected.
//!
//! ## Observability
//!
//! ```rust,no_run
//! # use bot_insight::BotInsight;
//! # let insight = BotInsight::open_in_memory().unwrap();
//! let snapshot = insight.metrics().snapshot();
//! println!("Recorded: {}", snapshot.events_recorded);
//! println!("Suppression rate: {:.2}%", snapshot.suppression_rate() * 100.0);
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{
    capture::RequestCapture,
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    dedupe::DedupeGate,
    maintenance::{CleanupOutcome, MaintenanceScheduler},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, DedupeStore, EventStore, OptionStore, StoreError},
    recorder::{EventRecorder, RecordOutcome},
    settings::SettingsService,
};
pub use domain::{
    classify::{classify, classify_risk, classify_search_bot, Classification, RiskTag},
    event::{
        Category, CategoryCounts, Event, EventFilter, InsightSummary, RiskLevel, StoredEvent,
        SubtypeCount,
    },
    request::{PendingCapture, RequestKind, RequestParts, ResponseOutcome},
    settings::{RawSettings, Settings},
    signature::DedupeKey,
};
pub use infrastructure::{
    clock::SystemClock,
    insight::{BotInsight, BotInsightBuilder, BuildError},
    sqlite::SqliteStore,
    storage::ShardedTtlStore,
};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_storage::{RedisDedupeConfig, RedisDedupeStore};
