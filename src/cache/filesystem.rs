//! Filesystem-backed offline cache
//!
//! Each entry is a data file named after the URL-safe base64 of its key, with
//! a `.meta.json` sidecar that records the original key so entries survive a
//! restart. Total size is bounded; the least recently used entries are
//! evicted first.
//!
//! Writes go to a temporary file that is renamed into place, data before
//! sidecar, and stores are serialized. A lookup only serves data whose length
//! matches its sidecar, so an entry being replaced is never read half-written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::loader::ResourceKind;
use crate::transport::Payload;

use super::{CacheGateway, CacheStats};

/// Configuration for the filesystem cache
#[derive(Debug, Clone, PartialEq)]
pub struct FilesystemCacheConfig {
    /// Directory holding the entries
    pub base_path: PathBuf,
    /// Maximum total size in bytes
    pub max_size_bytes: u64,
    /// Serve file and scene loads offline
    pub scene_offline: bool,
    /// Serve texture loads offline
    pub textures_offline: bool,
}

impl Default for FilesystemCacheConfig {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for FilesystemCacheConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            base_path: config.base_path.clone(),
            max_size_bytes: config.max_size_mb.saturating_mul(1024 * 1024),
            scene_offline: config.scene_offline,
            textures_offline: config.textures_offline,
        }
    }
}

/// Sidecar metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMeta {
    original_key: String,
    size: u64,
    binary: bool,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct LruEntry {
    size: u64,
    last_accessed: DateTime<Utc>,
}

#[derive(Default)]
struct CacheState {
    scanned: bool,
    total_size: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    lru_map: HashMap<String, LruEntry>,
}

/// Directory-backed [`CacheGateway`]
pub struct FilesystemCache {
    config: FilesystemCacheConfig,
    state: Arc<RwLock<CacheState>>,
    store_lock: Mutex<()>,
    tmp_counter: AtomicU64,
}

impl FilesystemCache {
    /// Create a cache; the directory is created on the first `open`
    pub fn new(config: FilesystemCacheConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(CacheState::default())),
            store_lock: Mutex::new(()),
            tmp_counter: AtomicU64::new(0),
        }
    }

    /// Directory holding the entries
    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Maximum total size in bytes
    pub fn max_size_bytes(&self) -> u64 {
        self.config.max_size_bytes
    }

    fn encode_key(key: &str) -> String {
        URL_SAFE_NO_PAD.encode(key.as_bytes())
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        self.config.base_path.join(Self::encode_key(key))
    }

    fn key_to_meta_path(&self, key: &str) -> PathBuf {
        self.config
            .base_path
            .join(format!("{}.meta.json", Self::encode_key(key)))
    }

    /// Write `contents` next to `path` and rename it into place
    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), CacheError> {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(format!(".tmp{}", n));
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, contents).await?;
        if let Err(e) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn count_miss(&self) {
        self.state.write().await.misses += 1;
    }

    /// Rebuild the size accounting from the sidecars on disk
    async fn scan_existing_entries(&self, state: &mut CacheState) -> Result<(), CacheError> {
        let base_path = &self.config.base_path;
        let mut entries = fs::read_dir(base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(encoded) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".meta.json"))
            else {
                continue;
            };

            let Ok(content) = fs::read_to_string(&path).await else {
                continue;
            };
            let Ok(meta) = serde_json::from_str::<StoredMeta>(&content) else {
                warn!(path = %path.display(), "Skipping unreadable cache sidecar");
                continue;
            };

            if let Ok(file_meta) = fs::metadata(base_path.join(encoded)).await {
                let size = file_meta.len();
                state.total_size += size;
                state.lru_map.insert(
                    meta.original_key,
                    LruEntry {
                        size,
                        last_accessed: meta.stored_at,
                    },
                );
            }
        }

        debug!(
            entries = state.lru_map.len(),
            total_size = state.total_size,
            "Scanned cache directory"
        );
        Ok(())
    }

    /// Evict least recently used entries until `required_space` fits
    async fn evict_lru(&self, required_space: u64) {
        let max_size = self.config.max_size_bytes;

        loop {
            let target = {
                let mut state = self.state.write().await;
                if state.total_size + required_space <= max_size {
                    break;
                }
                let Some(key) = state
                    .lru_map
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_accessed)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                if let Some(entry) = state.lru_map.remove(&key) {
                    state.total_size = state.total_size.saturating_sub(entry.size);
                }
                state.evictions += 1;
                key
            };

            debug!(key = %target, "Evicting cache entry");
            let _ = fs::remove_file(self.key_to_path(&target)).await;
            let _ = fs::remove_file(self.key_to_meta_path(&target)).await;
        }
    }

    /// Remove one entry
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        {
            let mut state = self.state.write().await;
            if let Some(entry) = state.lru_map.remove(key) {
                state.total_size = state.total_size.saturating_sub(entry.size);
            }
        }
        let _ = fs::remove_file(self.key_to_path(key)).await;
        let _ = fs::remove_file(self.key_to_meta_path(key)).await;
        Ok(())
    }

    /// Remove every entry
    pub async fn purge(&self) -> Result<(), CacheError> {
        let keys: Vec<String> = {
            let mut state = self.state.write().await;
            state.total_size = 0;
            state.lru_map.drain().map(|(k, _)| k).collect()
        };
        for key in keys {
            let _ = fs::remove_file(self.key_to_path(&key)).await;
            let _ = fs::remove_file(self.key_to_meta_path(&key)).await;
        }
        Ok(())
    }

    /// Current statistics
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        CacheStats {
            entries: state.lru_map.len() as u64,
            total_size_bytes: state.total_size,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

#[async_trait]
impl CacheGateway for FilesystemCache {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn offline_enabled(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::File => self.config.scene_offline,
            ResourceKind::Texture => self.config.textures_offline,
        }
    }

    async fn open(&self) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        if state.scanned {
            return Ok(());
        }
        fs::create_dir_all(&self.config.base_path).await?;
        self.scan_existing_entries(&mut state).await?;
        state.scanned = true;
        Ok(())
    }

    async fn lookup(&self, key: &str, binary: bool) -> Result<Option<Payload>, CacheError> {
        // Sidecar first; it is written only after the data is in place
        let meta_content = match fs::read_to_string(self.key_to_meta_path(key)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.count_miss().await;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let Ok(meta) = serde_json::from_str::<StoredMeta>(&meta_content) else {
            debug!(key = key, "Unreadable cache sidecar, treating as miss");
            self.count_miss().await;
            return Ok(None);
        };

        let data = match fs::read(self.key_to_path(key)).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.count_miss().await;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        // Entry replaced between the two reads
        if data.len() as u64 != meta.size {
            debug!(
                key = key,
                expected = meta.size,
                actual = data.len(),
                "Cache entry changed during lookup, treating as miss"
            );
            self.count_miss().await;
            return Ok(None);
        }

        let mut state = self.state.write().await;
        state.hits += 1;
        if let Some(entry) = state.lru_map.get_mut(key) {
            entry.last_accessed = Utc::now();
        }

        Ok(Some(Payload::from_bytes(data, binary)))
    }

    async fn store(&self, key: &str, payload: &Payload) -> Result<(), CacheError> {
        let size = payload.len() as u64;
        if size > self.config.max_size_bytes {
            return Err(CacheError::Unavailable(format!(
                "entry of {} bytes exceeds cache capacity",
                size
            )));
        }

        let _guard = self.store_lock.lock().await;

        let needs_eviction = {
            let state = self.state.read().await;
            let replaced = state.lru_map.get(key).map(|e| e.size).unwrap_or(0);
            state.total_size - replaced + size > self.config.max_size_bytes
        };
        if needs_eviction {
            self.evict_lru(size).await;
        }

        fs::create_dir_all(&self.config.base_path).await?;
        self.write_atomic(&self.key_to_path(key), payload.as_bytes()).await?;

        let stored_at = Utc::now();
        let meta = StoredMeta {
            original_key: key.to_string(),
            size,
            binary: payload.is_binary(),
            stored_at,
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.write_atomic(&self.key_to_meta_path(key), meta_json.as_bytes()).await?;

        let mut state = self.state.write().await;
        if let Some(old) = state.lru_map.get(key) {
            state.total_size = state.total_size.saturating_sub(old.size);
        }
        state.total_size += size;
        state.lru_map.insert(
            key.to_string(),
            LruEntry {
                size,
                last_accessed: stored_at,
            },
        );

        debug!(key = key, size = size, "Stored cache entry");
        Ok(())
    }
}
