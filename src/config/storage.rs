//! Cache file locations.

use serde::Deserialize;

const DEFAULT_STOP_CACHE_PATH: &str = ".cache.yaml";
const DEFAULT_ORDER_CACHE_PATH: &str = ".market-cache.yaml";

/// Where the persisted stop and limit-order caches live.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// YAML file holding the last committed stop per exchange and pair.
    #[serde(default = "default_stop_cache_path")]
    pub stop_cache_path: String,
    /// YAML file holding open protective limit orders.
    #[serde(default = "default_order_cache_path")]
    pub order_cache_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            stop_cache_path: default_stop_cache_path(),
            order_cache_path: default_order_cache_path(),
        }
    }
}

fn default_stop_cache_path() -> String {
    DEFAULT_STOP_CACHE_PATH.to_string()
}

fn default_order_cache_path() -> String {
    DEFAULT_ORDER_CACHE_PATH.to_string()
}
