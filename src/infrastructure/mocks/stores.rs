//! Store doubles for testing.

use crate::application::ports::{DedupeStore, EventStore, StoreError};
use crate::domain::classify::contains_ignore_ascii_case;
use crate::domain::event::{
    Category, CategoryCounts, Event, EventFilter, StoredEvent, SubtypeCount,
};
use crate::domain::signature::DedupeKey;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Dedupe store whose every call fails as if the backend were down.
#[derive(Debug, Default)]
pub struct FailingDedupeStore {
    calls: AtomicUsize,
}

impl FailingDedupeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `exists` / `set_with_ttl` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DedupeStore for FailingDedupeStore {
    fn exists(&self, _key: &DedupeKey) -> Result<bool, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn set_with_ttl(&self, _key: &DedupeKey, _ttl: Duration) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

/// Event store that rejects every operation.
#[derive(Debug, Default)]
pub struct FailingEventStore;

impl FailingEventStore {
    pub fn new() -> Self {
        Self
    }

    fn error() -> StoreError {
        StoreError::Backend("disk I/O error".to_string())
    }
}

impl EventStore for FailingEventStore {
    fn insert(&self, _event: &Event) -> Result<i64, StoreError> {
        Err(Self::error())
    }

    fn query(&self, _filter: &EventFilter, _limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        Err(Self::error())
    }

    fn count_by_category(&self) -> Result<CategoryCounts, StoreError> {
        Err(Self::error())
    }

    fn count_search_by_subtype(&self) -> Result<Vec<SubtypeCount>, StoreError> {
        Err(Self::error())
    }

    fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        Err(Self::error())
    }

    fn truncate_all(&self) -> Result<(), StoreError> {
        Err(Self::error())
    }
}

/// In-memory event store that also records how it was used.
#[derive(Debug, Default)]
pub struct RecordingEventStore {
    events: Mutex<Vec<StoredEvent>>,
    next_id: Mutex<i64>,
    delete_calls: AtomicUsize,
    fail_deletes: AtomicBool,
}

impl RecordingEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored events in insertion order.
    pub fn events(&self) -> Vec<Event> {
        self.lock().iter().map(|stored| stored.event.clone()).collect()
    }

    /// Number of `delete_older_than` calls, failed ones included.
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Make `delete_older_than` fail until switched back.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredEvent>> {
        self.events
            .lock()
            .expect("RecordingEventStore mutex poisoned - a test thread panicked while holding the lock")
    }
}

fn matches(filter: &EventFilter, event: &Event) -> bool {
    if filter.category.is_some_and(|c| c != event.category) {
        return false;
    }
    if filter.effective_status().is_some_and(|s| s != event.status) {
        return false;
    }
    match filter.effective_text() {
        Some(text) => [&event.user_agent, &event.path, &event.ip, &event.subtype]
            .iter()
            .any(|field| contains_ignore_ascii_case(field, text)),
        None => true,
    }
}

impl EventStore for RecordingEventStore {
    fn insert(&self, event: &Event) -> Result<i64, StoreError> {
        let mut next_id = self
            .next_id
            .lock()
            .expect("RecordingEventStore mutex poisoned - a test thread panicked while holding the lock");
        *next_id += 1;
        let id = *next_id;

        self.lock().push(StoredEvent {
            id,
            event: event.clone(),
        });
        Ok(id)
    }

    fn query(&self, filter: &EventFilter, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        let mut found: Vec<StoredEvent> = self
            .lock()
            .iter()
            .filter(|stored| matches(filter, &stored.event))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.event
                .created_at
                .cmp(&a.event.created_at)
                .then(b.id.cmp(&a.id))
        });
        found.truncate(limit);
        Ok(found)
    }

    fn count_by_category(&self) -> Result<CategoryCounts, StoreError> {
        let mut counts = CategoryCounts::default();
        for stored in self.lock().iter() {
            match stored.event.category {
                Category::Search => counts.search += 1,
                Category::Risk => counts.risk += 1,
            }
        }
        Ok(counts)
    }

    fn count_search_by_subtype(&self) -> Result<Vec<SubtypeCount>, StoreError> {
        let mut by_subtype: BTreeMap<String, u64> = BTreeMap::new();
        for stored in self.lock().iter() {
            if stored.event.category == Category::Search {
                *by_subtype.entry(stored.event.subtype.clone()).or_default() += 1;
            }
        }

        let mut counts: Vec<SubtypeCount> = by_subtype
            .into_iter()
            .map(|(subtype, count)| SubtypeCount { subtype, count })
            .collect();
        // Stable sort keeps name order among equal counts
        counts.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(counts)
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database is locked".to_string()));
        }

        let mut events = self.lock();
        let before = events.len();
        events.retain(|stored| stored.event.created_at >= cutoff);
        Ok(before - events.len())
    }

    fn truncate_all(&self) -> Result<(), StoreError> {
        self.lock().clear();
        Ok(())
    }
}
