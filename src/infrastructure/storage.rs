//! In-process dedupe storage.
//!
//! Provides a concurrent, sharded expiring key set for single-process
//! deployments. Use the Redis adapter when several processes must share
//! dedupe state.

use crate::application::ports::{Clock, DedupeStore, StoreError};
use crate::domain::signature::DedupeKey;
use ahash::RandomState;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on tracked keys.
pub const DEFAULT_MAX_KEYS: usize = 100_000;

/// Thread-safe sharded expiring key set backed by DashMap.
///
/// Each key maps to its expiry time. Expired keys read as absent and are
/// swept lazily when the set reaches capacity. If it is still full after a
/// sweep, new keys are not tracked, so the gate lets their events through.
#[derive(Debug)]
pub struct ShardedTtlStore {
    map: DashMap<DedupeKey, DateTime<Utc>, RandomState>,
    clock: Arc<dyn Clock>,
    max_keys: usize,
}

impl ShardedTtlStore {
    /// Create a store bounded to [`DEFAULT_MAX_KEYS`] keys.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, DEFAULT_MAX_KEYS)
    }

    /// Create a store tracking at most `max_keys` keys.
    pub fn with_capacity(clock: Arc<dyn Clock>, max_keys: usize) -> Self {
        Self {
            map: DashMap::with_hasher(RandomState::new()),
            clock,
            max_keys,
        }
    }

    /// Number of tracked keys, expired ones included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop every expired key.
    ///
    /// # Returns
    /// The number of removed keys.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.map.len();
        self.map.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.map.len())
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

impl DedupeStore for ShardedTtlStore {
    fn exists(&self, key: &DedupeKey) -> Result<bool, StoreError> {
        let now = self.clock.now();
        Ok(self
            .map
            .get(key)
            .is_some_and(|expires_at| *expires_at > now))
    }

    fn set_with_ttl(&self, key: &DedupeKey, ttl: Duration) -> Result<(), StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Backend(format!("ttl out of range: {}", e)))?;
        let expires_at = self.clock.now() + ttl;

        if self.map.len() >= self.max_keys && !self.map.contains_key(key) {
            let swept = self.sweep_expired();
            if self.map.len() >= self.max_keys {
                tracing::debug!(
                    max_keys = self.max_keys,
                    swept,
                    "Dedupe store full, key not tracked"
                );
                return Ok(());
            }
        }

        self.map.insert(*key, expires_at);
        Ok(())
    }
}
