//! Trailing stop agent.
//!
//! Builds exchanges, notifiers and caches from the config, then runs one
//! poll task per position until every position resolves.

mod error;
mod runner;

pub use error::BotError;
pub use runner::run_position;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::domain::Position;
use crate::exchanges::Manager;
use crate::notification::{
    Event, MultiNotifier, NoopNotifier, Notifier, ShutdownData, SlackNotifier, SlackSettings,
    StartupData, TelegramNotifier, TelegramSettings,
};
use crate::storage::{OrderCache, StopCache, new_cache_lock};
use crate::trailing::Trailing;

/// How the bot stopped when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Every position resolved.
    Finished,
    /// Ctrl-C.
    Interrupted,
}

/// Bot coordinates all positions.
pub struct Bot {
    cfg: Config,
    manager: Manager,
    notifier: Arc<dyn Notifier>,
    stop_cache: StopCache,
    order_cache: OrderCache,
    version: String,
}

impl Bot {
    /// Builds exchanges and notifiers from a loaded config.
    pub async fn from_config(cfg: Config) -> Result<Self, BotError> {
        let manager = Manager::from_config(&cfg).await?;
        let notifier = build_notifier(&cfg);
        Ok(Self::new(cfg, manager, notifier))
    }

    pub fn new(cfg: Config, manager: Manager, notifier: Arc<dyn Notifier>) -> Self {
        let lock = new_cache_lock();
        let stop_cache = StopCache::new(&cfg.storage.stop_cache_path, lock.clone());
        let order_cache = OrderCache::new(&cfg.storage.order_cache_path, lock);

        Self {
            cfg,
            manager,
            notifier,
            stop_cache,
            order_cache,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Runs every position to completion.
    pub async fn run(&self) -> Result<Shutdown, BotError> {
        let started_at = Instant::now();
        self.manager.connect_all().await?;

        let positions = self.build_positions().await?;
        let labels: Vec<String> = positions.iter().map(|(t, _)| t.label()).collect();

        info!(
            version = %self.version,
            app = %self.cfg.app.name,
            positions = ?labels,
            "Starting trailing stop"
        );
        self.send_notification(Event::startup(StartupData {
            version: self.version.clone(),
            exchanges: self.manager.list().await,
            positions: labels,
        }))
        .await;

        let mut tasks = JoinSet::new();
        for (trailing, interval) in positions {
            tasks.spawn(run_position(trailing, interval));
        }

        let result = supervise(&mut tasks).await;

        let (reason, graceful) = match &result {
            Ok(Shutdown::Finished) => ("all positions finished".to_string(), true),
            Ok(Shutdown::Interrupted) => ("interrupted".to_string(), true),
            Err(e) => (e.to_string(), false),
        };
        let uptime = started_at.elapsed();
        info!(reason = %reason, uptime = ?uptime, "Trailing stop stopped");

        self.send_notification(Event::shutdown(ShutdownData {
            reason,
            uptime,
            graceful,
        }))
        .await;
        if let Err(e) = self.notifier.close().await {
            debug!(error = %e, "Failed to close notifier");
        }

        result
    }

    /// Builds one engine per configured position, restoring cached state.
    async fn build_positions(&self) -> Result<Vec<(Trailing, Duration)>, BotError> {
        let mention = self
            .cfg
            .notification
            .as_ref()
            .and_then(|n| n.mention.clone());

        let mut positions = Vec::with_capacity(self.cfg.positions.len());
        for (index, pc) in self.cfg.positions.iter().enumerate() {
            let position =
                Position::from_config(pc).map_err(|source| BotError::Position { index, source })?;
            let exchange = self
                .manager
                .get(&pc.exchange)
                .await
                .ok_or_else(|| BotError::UnknownExchange(pc.exchange.clone()))?;

            let mut trailing = Trailing::new(
                position,
                exchange,
                self.notifier.clone(),
                self.stop_cache.clone(),
                self.order_cache.clone(),
            )
            .with_mention(mention.clone());
            trailing.restore().await;

            let interval = pc.interval.unwrap_or_else(|| self.cfg.polling.interval());
            positions.push((trailing, interval));
        }

        Ok(positions)
    }

    async fn send_notification(&self, event: Event) {
        if let Err(e) = self.notifier.send(&event).await {
            debug!(
                event_type = %event.event_type,
                error = %e,
                "Failed to send notification"
            );
        }
    }
}

/// Waits for every task, stopping all of them on Ctrl-C or a fatal error.
async fn supervise(tasks: &mut JoinSet<Result<(), BotError>>) -> Result<Shutdown, BotError> {
    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                None => return Ok(Shutdown::Finished),
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    error!(error = %e, "Aborting all positions");
                    tasks.abort_all();
                    return Err(e);
                }
                Some(Err(e)) if e.is_cancelled() => {}
                Some(Err(e)) => error!(error = %e, "Position task panicked"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping all positions");
                tasks.abort_all();
                return Ok(Shutdown::Interrupted);
            }
        }
    }
}

/// Combines every configured channel, or a no-op when none is usable.
fn build_notifier(cfg: &Config) -> Arc<dyn Notifier> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(notification) = &cfg.notification {
        if let Some(telegram) = notification.telegram.as_ref().filter(|t| t.enabled) {
            match TelegramNotifier::new(TelegramSettings::from_config(telegram)) {
                Ok(notifier) => {
                    notifiers.push(Arc::new(notifier));
                    info!("Telegram notifier created");
                }
                Err(e) => warn!(error = %e, "Failed to create Telegram notifier"),
            }
        }

        if let Some(slack) = notification.slack.as_ref().filter(|s| s.enabled) {
            match SlackNotifier::new(SlackSettings::from_config(slack)) {
                Ok(notifier) => {
                    notifiers.push(Arc::new(notifier));
                    info!("Slack notifier created");
                }
                Err(e) => warn!(error = %e, "Failed to create Slack notifier"),
            }
        }
    }

    let multi = MultiNotifier::new(notifiers);
    if multi.is_empty() {
        Arc::new(NoopNotifier::new())
    } else {
        Arc::new(multi)
    }
}
