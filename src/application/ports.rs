//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::event::{CategoryCounts, Event, EventFilter, StoredEvent, SubtypeCount};
use crate::domain::signature::DedupeKey;
use chrono::{DateTime, Utc};
use std::fmt::{self, Debug};
use std::time::Duration;

/// Error reported by a storage adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    Unavailable(String),
    /// The backend answered, but the operation failed.
    Backend(String),
    /// Stored data could not be decoded.
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
            StoreError::Backend(msg) => write!(f, "store operation failed: {}", msg),
            StoreError::Corrupt(msg) => write!(f, "corrupt stored data: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::CannotOpen
                ) =>
            {
                StoreError::Unavailable(e.to_string())
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..) => StoreError::Corrupt(e.to_string()),
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

#[cfg(feature = "redis-storage")]
impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error()
            || e.is_connection_dropped()
            || e.is_connection_refusal()
            || e.is_timeout()
        {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Port for the expiring key set behind the dedupe gate.
///
/// `exists` followed by `set_with_ttl` is not required to be atomic.
pub trait DedupeStore: Send + Sync + Debug {
    /// Whether `key` was set and has not expired yet.
    fn exists(&self, key: &DedupeKey) -> Result<bool, StoreError>;

    /// Mark `key` as seen for `ttl`.
    fn set_with_ttl(&self, key: &DedupeKey, ttl: Duration) -> Result<(), StoreError>;
}

/// Port for the durable event table.
pub trait EventStore: Send + Sync + Debug {
    /// Append one event, returning its id.
    fn insert(&self, event: &Event) -> Result<i64, StoreError>;

    /// Events matching `filter`, newest first, at most `limit` of them.
    fn query(&self, filter: &EventFilter, limit: usize) -> Result<Vec<StoredEvent>, StoreError>;

    /// Number of events per category.
    fn count_by_category(&self) -> Result<CategoryCounts, StoreError>;

    /// Number of search events per crawler, most frequent first.
    fn count_search_by_subtype(&self) -> Result<Vec<SubtypeCount>, StoreError>;

    /// Delete every event created strictly before `cutoff`.
    ///
    /// # Returns
    /// The number of deleted events.
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Delete every event.
    fn truncate_all(&self) -> Result<(), StoreError>;
}

/// Port for small named values (settings, maintenance timestamp).
pub trait OptionStore: Send + Sync + Debug {
    fn get(&self, name: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, name: &str, value: &str) -> Result<(), StoreError>;
}
