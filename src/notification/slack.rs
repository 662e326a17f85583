use std::time::Duration;
use tokio::sync::mpsc;
use tracing::error;

use crate::config::SlackConfig;
use crate::notification::{Event, EventType, NotificationError, Notifier, format_event};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const ASYNC_QUEUE_SIZE: usize = 100;

/// Slack incoming webhook settings.
#[derive(Debug, Clone)]
pub struct SlackSettings {
    pub webhook_url: String,
    pub channel: Option<String>,
    pub username: Option<String>,
    pub icon_emoji: Option<String>,
}

impl SlackSettings {
    pub fn from_config(cfg: &SlackConfig) -> Self {
        Self {
            webhook_url: cfg.webhook_url.clone(),
            channel: cfg.channel.clone(),
            username: cfg.username.clone(),
            icon_emoji: cfg.icon_emoji.clone(),
        }
    }

    fn payload(&self, text: &str) -> serde_json::Value {
        let mut payload = serde_json::json!({ "text": text });
        if let Some(channel) = &self.channel {
            payload["channel"] = channel.clone().into();
        }
        if let Some(username) = &self.username {
            payload["username"] = username.clone().into();
        }
        if let Some(icon) = &self.icon_emoji {
            payload["icon_emoji"] = icon.clone().into();
        }
        payload
    }
}

/// Posts notifications to a Slack incoming webhook.
pub struct SlackNotifier {
    settings: SlackSettings,
    http_client: reqwest::Client,
    sender: mpsc::Sender<Event>,
}

impl SlackNotifier {
    pub fn new(settings: SlackSettings) -> Result<Self, NotificationError> {
        if settings.webhook_url.is_empty() {
            return Err(NotificationError::new("webhook_url is required"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::new(format!("Failed to create HTTP client: {}", e)))?;

        let (sender, mut receiver) = mpsc::channel::<Event>(ASYNC_QUEUE_SIZE);

        let worker_settings = settings.clone();
        let worker_client = http_client.clone();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = post(&worker_client, &worker_settings, &event).await {
                    error!(error = %e, "Failed to send Slack message");
                }
            }
        });

        Ok(Self {
            settings,
            http_client,
            sender,
        })
    }
}

async fn post(
    http_client: &reqwest::Client,
    settings: &SlackSettings,
    event: &Event,
) -> Result<(), NotificationError> {
    let payload = settings.payload(&format_event(event));

    let response = http_client
        .post(&settings.webhook_url)
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
            "Slack webhook error: {} - {}",
            status, body
        )));
    }

    Ok(())
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        post(&self.http_client, &self.settings, event).await
    }

    fn send_async(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            error!(error = %e, "Failed to queue Slack message");
        }
    }

    fn is_enabled(&self, _event_type: EventType) -> bool {
        true
    }

    async fn close(&self) -> Result<(), NotificationError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}
