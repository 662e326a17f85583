//! Stop engine error types.

use crate::exchanges::ExchangeError;
use crate::storage::StorageError;

/// TrailingError ends one evaluation.
#[derive(Debug, thiserror::Error)]
pub enum TrailingError {
    /// Exchange call failed; the next tick retries.
    #[error("cannot {action}: {source}")]
    Exchange {
        action: &'static str,
        #[source]
        source: ExchangeError,
    },

    /// A cache could not be written.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl TrailingError {
    /// Storage failures stop the whole process, everything else is retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrailingError::Storage(_))
    }
}

/// Attaches the failed action to an exchange result.
pub(super) trait ExchangeContext<T> {
    fn context(self, action: &'static str) -> Result<T, TrailingError>;
}

impl<T> ExchangeContext<T> for Result<T, ExchangeError> {
    fn context(self, action: &'static str) -> Result<T, TrailingError> {
        self.map_err(|source| TrailingError::Exchange { action, source })
    }
}
