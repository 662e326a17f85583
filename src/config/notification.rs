//! Notification configuration.

use serde::Deserialize;

/// Notification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Mention appended to successful sell messages (CHAT_NOTIFY env var wins).
    pub mention: Option<String>,
    /// Telegram bot notifications.
    pub telegram: Option<TelegramConfig>,
    /// Slack incoming webhook notifications.
    pub slack: Option<SlackConfig>,
}

/// Telegram notification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Whether Telegram notifications are active.
    #[serde(default)]
    pub enabled: bool,
    /// Bot token (loaded from TELEGRAM_BOT_TOKEN env var).
    #[serde(skip)]
    pub bot_token: String,
    /// Target chat/channel ID (loaded from TELEGRAM_CHAT_ID env var).
    #[serde(skip)]
    pub chat_id: String,
    /// Target chat ID for error notifications (loaded from TELEGRAM_ERROR_CHAT_ID env var).
    #[serde(skip)]
    pub error_chat_id: String,
    /// Send position status messages (ready, guard, no coins).
    #[serde(default = "default_true")]
    pub notify_status: bool,
    /// Send a message every time a stop price moves.
    #[serde(default = "default_true")]
    pub notify_stops: bool,
    /// Send alerts when orders are executed.
    #[serde(default = "default_true")]
    pub notify_executions: bool,
    /// Send alerts when errors occur.
    #[serde(default = "default_true")]
    pub notify_errors: bool,
}

/// Slack webhook settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    /// Whether Slack notifications are active.
    #[serde(default)]
    pub enabled: bool,
    /// Incoming webhook URL (loaded from SLACK_WEBHOOK_URL env var).
    #[serde(skip)]
    pub webhook_url: String,
    /// Channel to post into, e.g. "#stoploss".
    pub channel: Option<String>,
    /// Display name of the poster.
    pub username: Option<String>,
    /// Icon shown next to messages, e.g. ":chart_with_downwards_trend:".
    pub icon_emoji: Option<String>,
}

fn default_true() -> bool {
    true
}
