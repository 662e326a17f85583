//! Binance spot exchange integration (binance.com, binance.us and testnet).

pub mod client;
mod exchange;

pub use client::Client;
pub use exchange::BinanceExchange;
