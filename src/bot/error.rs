//! Bot error types.

use crate::config::ConfigError;
use crate::domain::PairError;
use crate::exchanges::ExchangeError;
use crate::trailing::TrailingError;

/// Bot error type.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("position {index}: {source}")]
    Position {
        index: usize,
        #[source]
        source: PairError,
    },
    #[error("exchange {0} is not registered")]
    UnknownExchange(String),
    #[error("{position} stopped: {source}")]
    Fatal {
        position: String,
        #[source]
        source: TrailingError,
    },
}
