//! Persisted caches that let a trailing stop survive restarts.
//!
//! Both caches are small YAML files rewritten as a whole on every save.
//! A single [`CacheLock`] serializes every read-modify-write across tasks,
//! even though the files are independent.

mod order_cache;
mod stop_cache;
mod yaml_file;

pub use order_cache::{LimitOrderRecord, OrderCache};
pub use stop_cache::{StopCache, StopRecord};

use std::sync::Arc;
use tokio::sync::Mutex;

/// Process-wide lock guarding cache file I/O.
pub type CacheLock = Arc<Mutex<()>>;

/// Creates a fresh cache lock.
pub fn new_cache_lock() -> CacheLock {
    Arc::new(Mutex::new(()))
}

/// StorageError represents errors that can occur while writing a cache.
///
/// Reads never fail: a missing or unreadable file is an empty cache.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
