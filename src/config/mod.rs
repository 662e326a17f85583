//! Configuration loading and validation for the trailing stop agent.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for sensitive credentials.

mod app;
pub(crate) mod duration;
mod error;
mod exchange;
mod notification;
mod polling;
mod position;
mod retry;
mod storage;

pub use app::AppConfig;
pub use error::ConfigError;
pub use exchange::ExchangeConfig;
pub use notification::{NotificationConfig, SlackConfig, TelegramConfig};
pub use polling::{DEFAULT_POLL_INTERVAL, PollingConfig};
pub use position::PositionConfig;
pub use retry::RetryConfig;
pub use storage::StorageConfig;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::{collections::HashMap, env, fs};

use crate::domain::{OrderSide, Pair};

/// Root configuration structure for the trailing stop agent.
///
/// Required sections: app, exchanges, positions.
/// Optional sections: polling, storage, notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Maps exchange names to their configurations.
    pub exchanges: HashMap<String, ExchangeConfig>,
    /// Poll interval shared by all positions (optional).
    #[serde(default)]
    pub polling: PollingConfig,
    /// Cache file locations (optional).
    #[serde(default)]
    pub storage: StorageConfig,
    /// Alert channels like Telegram or Slack (optional).
    pub notification: Option<NotificationConfig>,
    /// Trailing stops to run, one task each.
    pub positions: Vec<PositionConfig>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` file (if exists),
    /// then loads YAML config and credentials from environment variables:
    /// - `{EXCHANGE}_API_KEY`, `{EXCHANGE}_API_SECRET`
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`, `TELEGRAM_ERROR_CHAT_ID`
    /// - `SLACK_WEBHOOK_URL`, `CHAT_NOTIFY`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        for (name, exchange) in self.exchanges.iter_mut() {
            if !exchange.enabled {
                continue;
            }

            let env_prefix = env_prefix(name);
            exchange.api_key = env::var(format!("{}_API_KEY", env_prefix)).unwrap_or_default();
            exchange.api_secret =
                env::var(format!("{}_API_SECRET", env_prefix)).unwrap_or_default();
        }

        if let Some(ref mut notification) = self.notification {
            if let Ok(mention) = env::var("CHAT_NOTIFY") {
                if !mention.is_empty() {
                    notification.mention = Some(mention);
                }
            }

            if let Some(ref mut telegram) = notification.telegram {
                if telegram.enabled {
                    telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
                    telegram.chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
                    telegram.error_chat_id = env::var("TELEGRAM_ERROR_CHAT_ID").unwrap_or_default();
                }
            }

            if let Some(ref mut slack) = notification.slack {
                if slack.enabled {
                    slack.webhook_url = env::var("SLACK_WEBHOOK_URL").unwrap_or_default();
                }
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        if self.positions.is_empty() {
            return Err(ConfigError::Validation(
                "at least one position is required".into(),
            ));
        }

        let is_production = !self.app.is_development();

        for (name, exchange) in &self.exchanges {
            if exchange.enabled
                && is_production
                && (exchange.api_key.is_empty() || exchange.api_secret.is_empty())
            {
                let prefix = env_prefix(name);
                return Err(ConfigError::Validation(format!(
                    "exchange {}: API credentials not found (set {}_API_KEY and {}_API_SECRET env vars)",
                    name, prefix, prefix
                )));
            }
        }

        for (index, position) in self.positions.iter().enumerate() {
            self.validate_position(position)
                .map_err(|msg| ConfigError::Validation(format!("positions[{}]: {}", index, msg)))?;
        }

        Ok(())
    }

    fn validate_position(&self, position: &PositionConfig) -> Result<(), String> {
        match self.exchanges.get(&position.exchange) {
            Some(exchange) if exchange.enabled => {}
            Some(_) => return Err(format!("exchange {} is not enabled", position.exchange)),
            None => return Err(format!("exchange {} is not configured", position.exchange)),
        }

        Pair::parse(&position.pair).map_err(|e| e.to_string())?;

        let percents = [
            ("start_percent", position.start_percent),
            ("end_percent", position.end_percent),
            ("max_loss_percent", position.max_loss_percent),
            ("limit_sell_percent", position.limit_sell_percent),
        ];
        for (field, value) in percents {
            if value < Decimal::ZERO || value >= Decimal::ONE_HUNDRED {
                return Err(format!("{} must be in [0, 100), got {}", field, value));
            }
        }

        if position.buy_price < Decimal::ZERO || position.price < Decimal::ZERO {
            return Err("prices must not be negative".into());
        }

        if let Some(amount) = position.amount {
            if amount <= Decimal::ZERO {
                return Err("amount must be positive".into());
            }
        }

        let has_percent = position.start_percent > Decimal::ZERO || position.end_percent > Decimal::ZERO;
        if !has_percent && position.price.is_zero() && position.max_loss_percent.is_zero() {
            return Err("a price or percent parameter is required".into());
        }

        if position.side == OrderSide::Sell
            && (position.max_loss_percent > Decimal::ZERO
                || position.limit_sell_percent > Decimal::ZERO)
            && position.buy_price.is_zero()
        {
            return Err("buy_price is required with max_loss_percent or limit_sell_percent".into());
        }

        Ok(())
    }
}

/// Environment variable prefix for an exchange name ("binance.us" -> "BINANCE_US").
fn env_prefix(name: &str) -> String {
    name.to_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
