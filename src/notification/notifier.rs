use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::OrderSide;

/// Kind of notification event, used for per-channel filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Position lifecycle message (ready, no coins, first run guard).
    Status,
    /// A committed stop price moved.
    StopChange,
    /// A protective limit order was placed or replaced.
    LimitOrder,
    /// A market order was sent.
    Execution,
    /// Something failed.
    Error,
    /// Agent started.
    Startup,
    /// Agent stopped.
    Shutdown,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Status => write!(f, "status"),
            EventType::StopChange => write!(f, "stop_change"),
            EventType::LimitOrder => write!(f, "limit_order"),
            EventType::Execution => write!(f, "execution"),
            EventType::Error => write!(f, "error"),
            EventType::Startup => write!(f, "startup"),
            EventType::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusData {
    pub exchange: String,
    pub pair: String,
    pub message: String,
}

/// Stop move details. Factors are fractions, not percents.
#[derive(Debug, Clone)]
pub struct StopChangeData {
    pub exchange: String,
    pub pair: String,
    pub side: OrderSide,
    pub start_factor: Decimal,
    pub end_factor: Decimal,
    pub max_loss_factor: Decimal,
    pub buy_price: Decimal,
    pub stop: Decimal,
    pub market_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct LimitOrderData {
    pub exchange: String,
    pub pair: String,
    pub side: OrderSide,
    pub order_id: String,
    pub quantity: Decimal,
    pub price: Decimal,
}

/// Market order outcome. `error` is set when the order was rejected.
#[derive(Debug, Clone)]
pub struct ExecutionData {
    pub exchange: String,
    pub pair: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub market_price: Decimal,
    pub order_id: Option<String>,
    pub error: Option<String>,
    pub mention: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ErrorData {
    pub component: String,
    pub message: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartupData {
    pub version: String,
    pub exchanges: Vec<String>,
    pub positions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ShutdownData {
    pub reason: String,
    pub uptime: Duration,
    pub graceful: bool,
}

#[derive(Debug, Clone)]
pub enum EventData {
    Status(StatusData),
    StopChange(StopChangeData),
    LimitOrder(LimitOrderData),
    Execution(ExecutionData),
    Error(ErrorData),
    Startup(StartupData),
    Shutdown(ShutdownData),
}

/// Notification event.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn status(exchange: &str, pair: &str, message: impl Into<String>) -> Self {
        Self::new(
            EventType::Status,
            EventData::Status(StatusData {
                exchange: exchange.to_string(),
                pair: pair.to_string(),
                message: message.into(),
            }),
        )
    }

    pub fn stop_change(data: StopChangeData) -> Self {
        Self::new(EventType::StopChange, EventData::StopChange(data))
    }

    pub fn limit_order(data: LimitOrderData) -> Self {
        Self::new(EventType::LimitOrder, EventData::LimitOrder(data))
    }

    pub fn execution(data: ExecutionData) -> Self {
        Self::new(EventType::Execution, EventData::Execution(data))
    }

    pub fn error(data: ErrorData) -> Self {
        Self::new(EventType::Error, EventData::Error(data))
    }

    pub fn startup(data: StartupData) -> Self {
        Self::new(EventType::Startup, EventData::Startup(data))
    }

    pub fn shutdown(data: ShutdownData) -> Self {
        Self::new(EventType::Shutdown, EventData::Shutdown(data))
    }
}

/// Sink for notification events.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers the event and waits for the result.
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// Queues the event without waiting.
    fn send_async(&self, event: Event);

    /// Whether this channel wants events of the given type.
    fn is_enabled(&self, event_type: EventType) -> bool;

    /// Flushes pending messages.
    async fn close(&self) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone)]
pub struct NotificationError {
    pub message: String,
}

impl fmt::Display for NotificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationError: {}", self.message)
    }
}

impl std::error::Error for NotificationError {}

impl NotificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// MultiNotifier fans events out to every enabled channel.
pub struct MultiNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[async_trait::async_trait]
impl Notifier for MultiNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                if let Err(e) = notifier.send(event).await {
                    errors.push(e.message);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }

    fn send_async(&self, event: Event) {
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                notifier.send_async(event.clone());
            }
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.notifiers.iter().any(|n| n.is_enabled(event_type))
    }

    async fn close(&self) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if let Err(e) = notifier.close().await {
                errors.push(e.message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }
}

/// NoopNotifier drops everything. Used when no channel is configured.
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _event: &Event) -> Result<(), NotificationError> {
        Ok(())
    }

    fn send_async(&self, _event: Event) {}

    fn is_enabled(&self, _event_type: EventType) -> bool {
        false
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// === Formatting ===

pub fn format_status(data: &StatusData) -> String {
    format!(
        "ℹ️ *{}* #{} on {}\n\n{}",
        data.pair,
        format_pair_tag(&data.pair),
        data.exchange,
        data.message
    )
}

/// Formats a stop move with gains relative to the buy price.
pub fn format_stop_change(data: &StopChangeData) -> String {
    let arrow = match data.side {
        OrderSide::Sell => "📈",
        OrderSide::Buy => "📉",
    };

    format!(
        "{} *{}* ({} Start:-{:.1}% End:-{:.1}% Max:-{:.1}%)\n\n\
         Stop Price: *{:.8}* ({})\n\
         Market Price: {:.8} ({})\n\
         Stop/Market: {}\n\n\
         ⏰ {}",
        arrow,
        data.pair,
        data.side,
        data.start_factor * Decimal::ONE_HUNDRED,
        data.end_factor * Decimal::ONE_HUNDRED,
        data.max_loss_factor * Decimal::ONE_HUNDRED,
        data.stop,
        format_gain(data.stop, data.buy_price),
        data.market_price,
        format_gain(data.market_price, data.buy_price),
        format_gain(data.stop, data.market_price),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_limit_order(data: &LimitOrderData) -> String {
    format!(
        "📌 *Limit {} placed*\n\n\
         Pair: {} #{}\n\
         Exchange: {}\n\
         Quantity: {} {}\n\
         Price: {:.8}\n\
         Order ID: {}\n\n\
         ⏰ {}",
        data.side.as_str().to_lowercase(),
        data.pair,
        format_pair_tag(&data.pair),
        data.exchange,
        data.quantity,
        parse_pair_base(&data.pair),
        data.price,
        data.order_id,
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_execution(data: &ExecutionData) -> String {
    let side = match data.side {
        OrderSide::Sell => "Sell",
        OrderSide::Buy => "Buy",
    };

    match &data.error {
        None => {
            let mention = data
                .mention
                .as_ref()
                .map(|m| format!("\n{}", m))
                .unwrap_or_default();
            format!(
                "✅ *{}: {} {}*\n\n\
                 Pair: {} #{}\n\
                 Exchange: {}\n\
                 Market Price: {:.8}\n\
                 Order ID: {}{}\n\n\
                 ⏰ {}",
                side,
                data.quantity,
                parse_pair_base(&data.pair),
                data.pair,
                format_pair_tag(&data.pair),
                data.exchange,
                data.market_price,
                data.order_id.as_deref().unwrap_or("-"),
                mention,
                Utc::now().format("%H:%M:%S UTC")
            )
        }
        Some(error) => format!(
            "❌ *Cannot create {} order*\n\n\
             Pair: {} #{}\n\
             Exchange: {}\n\
             Quantity: {}\n\
             Error: {}\n\n\
             ⏰ {}",
            data.side.as_str().to_lowercase(),
            data.pair,
            format_pair_tag(&data.pair),
            data.exchange,
            data.quantity,
            error,
            Utc::now().format("%H:%M:%S UTC")
        ),
    }
}

pub fn format_error(data: &ErrorData) -> String {
    let error_str = data
        .error
        .as_ref()
        .map(|e| format!("\nError: {}", e))
        .unwrap_or_default();

    format!(
        "⚠️ *Error*\n\n\
         Component: {}\n\
         Message: {}{}\n\n\
         ⏰ {}",
        data.component,
        data.message,
        error_str,
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_startup(data: &StartupData) -> String {
    format!(
        "🤖 *Trailing stop started*\n\n\
         Version: {}\n\
         Exchanges: {}\n\
         Positions: {}\n\n\
         ⏰ {}",
        data.version,
        data.exchanges.join(", "),
        data.positions.join(", "),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_shutdown(data: &ShutdownData) -> String {
    let status = if data.graceful {
        "✅ Graceful"
    } else {
        "⚠️ Forced"
    };

    format!(
        "🛑 *Trailing stop stopped*\n\n\
         Reason: {}\n\
         Status: {}\n\
         Uptime: {}\n\n\
         ⏰ {}",
        data.reason,
        status,
        format_duration(data.uptime),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_event(event: &Event) -> String {
    match &event.data {
        EventData::Status(data) => format_status(data),
        EventData::StopChange(data) => format_stop_change(data),
        EventData::LimitOrder(data) => format_limit_order(data),
        EventData::Execution(data) => format_execution(data),
        EventData::Error(data) => format_error(data),
        EventData::Startup(data) => format_startup(data),
        EventData::Shutdown(data) => format_shutdown(data),
    }
}

// === Helpers ===

/// Base coin of a pair ("BTC" from "BTC/USDT").
fn parse_pair_base(pair: &str) -> &str {
    pair.split('/').next().unwrap_or(pair)
}

/// Pair as a Telegram Markdown hashtag ("BTC/USDT" -> "BTC\_USDT").
fn format_pair_tag(pair: &str) -> String {
    pair.replace('/', "\\_")
}

/// Percentage change of `value` relative to `base`, or "n/a" when base is zero.
fn format_gain(value: Decimal, base: Decimal) -> String {
    match (value - base).checked_div(base) {
        Some(ratio) => format!("{:.3}%", ratio * Decimal::ONE_HUNDRED),
        None => "n/a".to_string(),
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
