//! Offline cache gateways
//!
//! A [`CacheGateway`] is an optional persistent store the loader queries
//! before falling back to the transport. A miss, an open failure, or a lookup
//! failure all make the loader fall through to the network; cache errors are
//! never surfaced to the caller.
//!
//! # Components
//!
//! - [`filesystem`]: directory-backed gateway with LRU eviction

pub mod filesystem;

use async_trait::async_trait;
use crate::error::CacheError;
use crate::loader::ResourceKind;
use crate::transport::Payload;

pub use filesystem::{FilesystemCache, FilesystemCacheConfig};

/// Persistent store consulted before the transport
///
/// Implementations must tolerate concurrent calls for distinct keys.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheGateway: Send + Sync {
    /// Gateway name, used in log fields
    fn name(&self) -> &str;

    /// Whether offline lookups are enabled for this kind of resource
    fn offline_enabled(&self, kind: ResourceKind) -> bool;

    /// Prepare the store; called before every lookup
    async fn open(&self) -> Result<(), CacheError>;

    /// Look up a payload by key (the url without the base prefix)
    async fn lookup(&self, key: &str, binary: bool) -> Result<Option<Payload>, CacheError>;

    /// Write a payload fetched from the transport
    async fn store(&self, _key: &str, _payload: &Payload) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in the cache
    pub entries: u64,
    /// Total size of all entries in bytes
    pub total_size_bytes: u64,
    /// Number of lookup hits
    pub hits: u64,
    /// Number of lookup misses
    pub misses: u64,
    /// Number of evictions
    pub evictions: u64,
}

impl CacheStats {
    /// Hit ratio in `[0, 1]`, zero when nothing was looked up
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
