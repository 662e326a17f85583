//! Exchange configuration.

use serde::Deserialize;

use super::RetryConfig;

/// Settings for a single exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Whether this exchange should be used.
    #[serde(default)]
    pub enabled: bool,
    /// Use the exchange sandbox instead of the live API.
    #[serde(default)]
    pub testnet: bool,
    /// Overrides the REST endpoint (e.g. "https://api.binance.us").
    pub base_url: Option<String>,
    /// API key (loaded from environment variable).
    #[serde(skip)]
    pub api_key: String,
    /// API secret (loaded from environment variable).
    #[serde(skip)]
    pub api_secret: String,
    /// Maximum API requests per minute.
    pub rate_limit: Option<i64>,
    /// Retry policy for failed HTTP requests.
    pub retry: Option<RetryConfig>,
}
