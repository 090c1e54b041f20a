//! Failures in the pipeline are logged, never raised to the request.

use bot_insight::infrastructure::mocks::{
    FailingDedupeStore, FailingEventStore, MockCaptureLayer, MockClock,
};
use bot_insight::{BotInsight, RecordOutcome, RequestParts, ResponseOutcome, SqliteStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn scanner_request() -> RequestParts {
    RequestParts::new("/.env.production")
        .with_peer_addr("203.0.113.8")
        .with_user_agent("Nikto/2.5.0")
}

#[test]
fn test_write_failure_is_logged_at_warn() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());

    let insight = BotInsight::builder()
        .with_clock(Arc::new(MockClock::new(Utc::now())))
        .with_event_store(Arc::new(FailingEventStore::new()))
        .with_option_store(Arc::new(SqliteStore::open_in_memory().unwrap()))
        .build()
        .unwrap();

    let outcome = tracing::subscriber::with_default(subscriber, || {
        let pending = insight.capture(&scanner_request()).unwrap();
        insight.finalize(pending, ResponseOutcome::default())
    });

    assert_eq!(outcome, RecordOutcome::WriteFailed);
    assert_eq!(insight.metrics().write_failures(), 1);

    let warnings = capture.at_level(Level::WARN);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message, "Failed to record event");
    assert_eq!(warnings[0].field("subtype"), Some("probe_path"));
    assert_eq!(warnings[0].field("path"), Some("/.env.production"));
    assert!(warnings[0].target.starts_with("bot_insight"));
}

#[test]
fn test_dedupe_failure_is_logged_and_event_kept() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());

    let insight = BotInsight::builder()
        .with_clock(Arc::new(MockClock::new(Utc::now())))
        .with_sqlite(SqliteStore::open_in_memory().unwrap())
        .with_dedupe_store(Arc::new(FailingDedupeStore::new()))
        .build()
        .unwrap();

    let outcome = tracing::subscriber::with_default(subscriber, || {
        let pending = insight.capture(&scanner_request()).unwrap();
        insight.finalize(pending, ResponseOutcome::default())
    });

    assert!(outcome.is_recorded());
    assert!(capture.contains_message("Dedupe store failed, logging event anyway"));
    assert_eq!(capture.at_level(Level::WARN).len(), 1);
}

#[test]
fn test_saving_settings_is_logged() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let insight = BotInsight::open_in_memory().unwrap();

    tracing::subscriber::with_default(subscriber, || {
        insight
            .save_settings(&bot_insight::RawSettings::new().dedupe_ttl(5))
            .unwrap();
    });

    let saved = capture
        .at_level(Level::INFO)
        .into_iter()
        .find(|event| event.message == "Settings saved")
        .expect("settings save should be logged");
    assert_eq!(saved.field("dedupe_ttl"), Some("10"));
}
