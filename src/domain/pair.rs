//! Market pair parsing.

use std::fmt;
use thiserror::Error;

/// Invalid pair notation.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid pair {0:?}, expected BASE/QUOTE")]
pub struct PairError(pub String);

/// Market pair split into its base and quote coins, e.g. BNB/USDT.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    /// Parses "bnb/usdt" style notation, upper-casing both coins.
    pub fn parse(pair: &str) -> Result<Self, PairError> {
        let upper = pair.trim().to_uppercase();
        let mut parts = upper.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) if !base.is_empty() && !quote.is_empty() => Ok(Self {
                base: base.to_string(),
                quote: quote.to_string(),
            }),
            _ => Err(PairError(pair.to_string())),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}
