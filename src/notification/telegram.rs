use std::time::Duration;
use tokio::sync::mpsc;
use tracing::error;

use crate::config::TelegramConfig;
use crate::notification::{Event, EventType, NotificationError, Notifier, format_event};

const TELEGRAM_API_URL: &str = "https://api.telegram.org/bot";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_LENGTH: usize = 4096;
const ASYNC_QUEUE_SIZE: usize = 100;

/// Telegram notifier settings.
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    /// Token from BotFather.
    pub bot_token: String,
    /// Chat receiving every message.
    pub chat_id: String,
    /// Optional separate chat for errors.
    pub error_chat_id: Option<String>,
    pub notify_status: bool,
    pub notify_stops: bool,
    pub notify_executions: bool,
    pub notify_errors: bool,
}

impl TelegramSettings {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            error_chat_id: None,
            notify_status: true,
            notify_stops: true,
            notify_executions: true,
            notify_errors: true,
        }
    }

    pub fn with_error_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.error_chat_id = Some(chat_id.into());
        self
    }

    pub fn from_config(cfg: &TelegramConfig) -> Self {
        let mut settings = Self::new(cfg.bot_token.clone(), cfg.chat_id.clone());
        if !cfg.error_chat_id.is_empty() {
            settings = settings.with_error_chat_id(cfg.error_chat_id.clone());
        }
        settings.notify_status = cfg.notify_status;
        settings.notify_stops = cfg.notify_stops;
        settings.notify_executions = cfg.notify_executions;
        settings.notify_errors = cfg.notify_errors;
        settings
    }

    fn chat_for(&self, event_type: EventType) -> &str {
        match (event_type, &self.error_chat_id) {
            (EventType::Error, Some(chat_id)) => chat_id,
            _ => &self.chat_id,
        }
    }

    fn wants(&self, event_type: EventType) -> bool {
        match event_type {
            EventType::Startup | EventType::Shutdown => true,
            EventType::Status => self.notify_status,
            EventType::StopChange => self.notify_stops,
            EventType::LimitOrder | EventType::Execution => self.notify_executions,
            EventType::Error => self.notify_errors,
        }
    }
}

/// Sends notifications through the Telegram Bot API.
pub struct TelegramNotifier {
    settings: TelegramSettings,
    http_client: reqwest::Client,
    api_url: String,
    sender: mpsc::Sender<Event>,
}

impl TelegramNotifier {
    /// Creates the notifier and spawns its delivery worker.
    pub fn new(settings: TelegramSettings) -> Result<Self, NotificationError> {
        if settings.bot_token.is_empty() {
            return Err(NotificationError::new("bot_token is required"));
        }
        if settings.chat_id.is_empty() {
            return Err(NotificationError::new("chat_id is required"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::new(format!("Failed to create HTTP client: {}", e)))?;

        let api_url = format!("{}{}", TELEGRAM_API_URL, settings.bot_token);
        let (sender, receiver) = mpsc::channel(ASYNC_QUEUE_SIZE);

        Self::spawn_worker(receiver, settings.clone(), http_client.clone(), api_url.clone());

        Ok(Self {
            settings,
            http_client,
            api_url,
            sender,
        })
    }

    fn spawn_worker(
        mut receiver: mpsc::Receiver<Event>,
        settings: TelegramSettings,
        http_client: reqwest::Client,
        api_url: String,
    ) {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let chat_id = settings.chat_for(event.event_type);
                let text = format_event(&event);
                if let Err(e) = send_message(&http_client, &api_url, chat_id, &text).await {
                    error!(error = %e, "Failed to send Telegram message");
                }
            }
        });
    }
}

async fn send_message(
    http_client: &reqwest::Client,
    api_url: &str,
    chat_id: &str,
    text: &str,
) -> Result<(), NotificationError> {
    let text = truncate(text, MAX_MESSAGE_LENGTH);
    let url = format!("{}/sendMessage", api_url);

    let payload = serde_json::json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "Markdown"
    });

    let response = http_client
        .post(&url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| NotificationError::new(format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(NotificationError::new(format!(
            "Telegram API error: {} - {}",
            status, body
        )));
    }

    Ok(())
}

/// Cuts `text` to at most `max` bytes on a char boundary.
pub(super) fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        if !self.is_enabled(event.event_type) {
            return Ok(());
        }

        let chat_id = self.settings.chat_for(event.event_type);
        let text = format_event(event);
        send_message(&self.http_client, &self.api_url, chat_id, &text).await
    }

    fn send_async(&self, event: Event) {
        if !self.is_enabled(event.event_type) {
            return;
        }

        if let Err(e) = self.sender.try_send(event) {
            error!(error = %e, "Failed to queue Telegram message");
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.settings.wants(event_type)
    }

    async fn close(&self) -> Result<(), NotificationError> {
        // Give the worker a moment to drain the queue.
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}
