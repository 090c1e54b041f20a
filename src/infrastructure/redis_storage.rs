//! Redis-backed dedupe storage.
//!
//! Provides a shared expiring key set so that several application
//! instances suppress the same repeated events.
//!
//! ## Architecture
//!
//! - Keys: dedupe key hash as 16 hex digits with a configurable prefix
//! - Values: a `1` placeholder; only presence matters
//! - TTL: Redis `EX` expiry set to the dedupe window
//!
//! ## Error Handling
//!
//! Every command error is returned as [`StoreError`]. The dedupe gate logs
//! it, lets the event through and feeds its circuit breaker, so a Redis
//! outage never drops events.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bot_insight::{BotInsight, RedisDedupeConfig, RedisDedupeStore, SqliteStore};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() {
//!     let config = RedisDedupeConfig {
//!         key_prefix: "shop-eu:dedupe:".to_string(),
//!     };
//!     let store = RedisDedupeStore::connect_with_config("redis://127.0.0.1/", config)
//!         .await
//!         .expect("Failed to connect to Redis");
//!
//!     let insight = BotInsight::builder()
//!         .with_sqlite(SqliteStore::open("bot-insight.db").unwrap())
//!         .with_dedupe_store(Arc::new(store))
//!         .build()
//!         .unwrap();
//! }
//! ```

use crate::application::ports::{DedupeStore, StoreError};
use crate::domain::signature::DedupeKey;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::RwLock;

/// Configuration for Redis dedupe storage.
#[derive(Debug, Clone)]
pub struct RedisDedupeConfig {
    /// Key prefix for Redis keys (default: "bot-insight:dedupe:")
    pub key_prefix: String,
}

impl Default for RedisDedupeConfig {
    fn default() -> Self {
        Self {
            key_prefix: "bot-insight:dedupe:".to_string(),
        }
    }
}

/// Redis-backed expiring key set for distributed dedupe.
///
/// The synchronous [`DedupeStore`] calls need a multi-threaded tokio runtime
/// (or none at all). From a `current_thread` runtime every call returns
/// [`StoreError::Unavailable`], so events are logged without dedupe.
#[derive(Clone)]
pub struct RedisDedupeStore {
    connection: Arc<RwLock<ConnectionManager>>,
    config: RedisDedupeConfig,
}

impl fmt::Debug for RedisDedupeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisDedupeStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisDedupeStore {
    /// Connect to Redis with default configuration.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisDedupeConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisDedupeConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection: Arc::new(RwLock::new(connection)),
            config,
        })
    }

    pub fn config(&self) -> &RedisDedupeConfig {
        &self.config
    }

    /// Get the Redis key for a dedupe key.
    fn key(&self, key: &DedupeKey) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    async fn exists_async(&self, key: &DedupeKey) -> Result<bool, RedisError> {
        let mut conn = self.connection.write().await;
        conn.exists(self.key(key)).await
    }

    async fn set_async(&self, key: &DedupeKey, ttl: Duration) -> Result<(), RedisError> {
        // EX 0 is rejected by Redis
        let ttl_secs = ttl.as_secs().max(1);
        let mut conn = self.connection.write().await;
        conn.set_ex::<_, _, ()>(self.key(key), 1u8, ttl_secs).await
    }

    /// Delete every key under the configured prefix.
    ///
    /// # Returns
    /// The number of deleted keys.
    pub async fn clear(&self) -> Result<usize, RedisError> {
        let pattern = format!("{}*", self.config.key_prefix);
        let mut conn = self.connection.write().await;
        let mut cursor = 0u64;
        let mut deleted = 0usize;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await?;

            if !keys.is_empty() {
                let removed: usize = conn.del(&keys).await?;
                deleted += removed;
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        Ok(deleted)
    }
}

/// Run a Redis future from the synchronous port.
///
/// Inside a multi-threaded tokio runtime the current worker is handed over
/// with `block_in_place`; outside any runtime a temporary one is built.
///
/// A `current_thread` runtime cannot be blocked on: the connection's driver
/// task would never run again. The call then fails with
/// [`StoreError::Unavailable`] and the dedupe gate lets the event through.
fn block_on<F, T>(future: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, RedisError>>,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future)).map_err(StoreError::from)
            }
            flavor => Err(StoreError::Unavailable(format!(
                "redis dedupe store needs a multi-threaded tokio runtime, found {:?}",
                flavor
            ))),
        },
        Err(_) => {
            let rt = tokio::runtime::Runtime::new().map_err(|e| {
                StoreError::Unavailable(format!("failed to create tokio runtime: {}", e))
            })?;
            rt.block_on(future).map_err(StoreError::from)
        }
    }
}

impl DedupeStore for RedisDedupeStore {
    fn exists(&self, key: &DedupeKey) -> Result<bool, StoreError> {
        block_on(self.exists_async(key))
    }

    fn set_with_ttl(&self, key: &DedupeKey, ttl: Duration) -> Result<(), StoreError> {
        block_on(self.set_async(key, ttl))
    }
}
