//! Dedupe key computation.
//!
//! A dedupe key identifies a logically repeated event:
//! - Category and subtype (crawler name or risk tag)
//! - Client IP
//! - Request path
//! - The first [`USER_AGENT_PREFIX_BYTES`] bytes of the user-agent
//!
//! Only a bounded prefix of the user-agent takes part, so a client rotating
//! long random user-agent suffixes cannot inflate the key space beyond what
//! the prefix distinguishes.

use crate::domain::event::Category;
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of user-agent bytes that take part in the key.
pub const USER_AGENT_PREFIX_BYTES: usize = 64;

/// Hash identifying a class of repeated events.
///
/// The first 8 bytes of a SHA-256 over the length-prefixed components.
/// Keys must not depend on the process, the build or the platform: the Redis
/// key set is shared between instances and outlives restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupeKey(u64);

impl DedupeKey {
    /// Compute the key for an event tuple.
    ///
    /// # Performance
    /// Hot path: no allocation, one pass over each component.
    pub fn new(category: Category, subtype: &str, ip: &str, path: &str, user_agent: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [
            category.as_str().as_bytes(),
            subtype.as_bytes(),
            ip.as_bytes(),
            path.as_bytes(),
            user_agent_prefix(user_agent),
        ] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }

        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        DedupeKey(u64::from_be_bytes(head))
    }

    /// Rebuild a key from its raw hash, e.g. when reading it back from Redis.
    pub fn from_hash(hash: u64) -> Self {
        DedupeKey(hash)
    }

    /// Get the raw hash value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Leading bytes of the user-agent that take part in the key.
///
/// Byte based, so a cut may land inside a multi-byte character; the bytes
/// are hashed, never displayed.
pub fn user_agent_prefix(user_agent: &str) -> &[u8] {
    let bytes = user_agent.as_bytes();
    &bytes[..bytes.len().min(USER_AGENT_PREFIX_BYTES)]
}
