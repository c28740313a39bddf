//! Registry of pre-supplied payloads
//!
//! Files handed to the loader up front (drag-and-drop, embedded assets) are
//! served for `file:` urls without touching the cache or the transport.
//! Names are matched case-insensitively.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use percent_encoding::percent_decode_str;

/// Shared, cloneable set of local files
#[derive(Debug, Clone, Default)]
pub struct LocalFiles {
    files: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl LocalFiles {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload under `name`
    pub fn register(&self, name: impl AsRef<str>, data: impl Into<Bytes>) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.as_ref().to_lowercase(), data.into());
    }

    /// Remove a payload, returning it if present
    pub fn remove(&self, name: &str) -> Option<Bytes> {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name.to_lowercase())
    }

    /// Look up a payload by registered name
    pub fn get(&self, name: &str) -> Option<Bytes> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.to_lowercase())
            .cloned()
    }

    /// Resolve a `file:` url to a registered payload
    ///
    /// The part after `file:` is percent-decoded and lower-cased before the
    /// lookup. Other schemes never resolve.
    pub fn resolve(&self, url: &str) -> Option<Bytes> {
        let name = url.strip_prefix("file:")?;
        let decoded = percent_decode_str(name).decode_utf8_lossy();
        self.get(&decoded)
    }

    /// Number of registered payloads
    pub fn len(&self) -> usize {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
