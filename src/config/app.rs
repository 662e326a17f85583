//! Application-level configuration.

use serde::Deserialize;

/// Application-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Application name, shown in startup notifications.
    pub name: String,
    /// Environment: "development", "staging", or "production".
    #[serde(default = "default_env")]
    pub env: String,
    /// Logging verbosity: "trace", "debug", "info", "warn", "error".
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Credentials are only optional while developing against a sandbox.
    pub fn is_development(&self) -> bool {
        self.env == "development"
    }
}

fn default_env() -> String {
    "production".to_string()
}
