//! Poll loop for a single position.

use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::BotError;
use crate::trailing::{Trailing, Verdict};

/// Evaluates the position every `interval` until it resolves.
///
/// Transient failures are reported and retried on the next tick. A fatal
/// failure ends the task with an error.
pub async fn run_position(mut trailing: Trailing, interval: Duration) -> Result<(), BotError> {
    let label = trailing.label();
    info!(position = %label, interval = ?interval, "Starting position");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match trailing.evaluate().await {
            Ok(Verdict::Continue) => {}
            Ok(Verdict::Terminal) => {
                info!(position = %label, "Position finished");
                return Ok(());
            }
            Err(e) if e.is_fatal() => {
                error!(position = %label, error = %e, "Fatal error");
                trailing.report(&e);
                return Err(BotError::Fatal {
                    position: label,
                    source: e,
                });
            }
            Err(e) => trailing.report(&e),
        }
    }
}
