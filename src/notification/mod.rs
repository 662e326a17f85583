//! Notification channels for position status, stop moves and executions.

mod notifier;
mod slack;
mod telegram;

pub use notifier::{
    ErrorData, Event, EventData, EventType, ExecutionData, LimitOrderData, MultiNotifier,
    NoopNotifier, NotificationError, Notifier, ShutdownData, StartupData, StopChangeData,
    format_event,
};
pub use slack::{SlackNotifier, SlackSettings};
pub use telegram::{TelegramNotifier, TelegramSettings};
