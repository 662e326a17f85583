//! Position state and the trailing stop price formulas.

use rust_decimal::{Decimal, RoundingStrategy};

use super::{OrderSide, Pair, PairError};
use crate::config::PositionConfig;

/// Position is the in-memory state of one trailing stop.
///
/// Factors are fractions (0.01 = 1%). `last_stop` only ratchets in the
/// trader's favour: up for sells, down for buys.
#[derive(Debug, Clone)]
pub struct Position {
    /// Exchange the position lives on.
    pub exchange: String,
    /// Sell protects a holding, buy waits for a bounce.
    pub side: OrderSide,
    /// Market pair.
    pub pair: Pair,
    /// Trailing distance used just above the buy price.
    pub start_stop_factor: Decimal,
    /// Trailing distance used at and above the limit sell ceiling.
    pub end_stop_factor: Decimal,
    /// Absolute floor below `buy_price`.
    pub max_loss_stop_factor: Decimal,
    /// Offset above `buy_price` for the protective limit sell.
    pub limit_sell_factor: Decimal,
    /// Reference acquisition price.
    pub buy_price: Decimal,
    /// Stop used when the trailing factors are not set.
    pub static_price: Decimal,
    /// Fixed order size; `None` means use the exchange balance.
    pub quantity: Option<Decimal>,
    /// Most recently committed stop. Zero before the first commit on the
    /// sell side, `Decimal::MAX` on the buy side.
    pub last_stop: Decimal,
    /// Highest market price seen since `last_stop` was last reset.
    pub observed_high_price: Decimal,
    /// Decimal places accepted for order quantities.
    pub coin_precision: Option<u32>,
    /// Protective limit order believed to be open on the exchange.
    pub protective_order_id: Option<String>,
}

impl Position {
    /// Builds a fresh position from its config entry, turning percents into factors.
    pub fn from_config(cfg: &PositionConfig) -> Result<Self, PairError> {
        let pair = Pair::parse(&cfg.pair)?;
        let last_stop = match cfg.side {
            OrderSide::Sell => Decimal::ZERO,
            OrderSide::Buy => Decimal::MAX,
        };

        Ok(Self {
            exchange: cfg.exchange.clone(),
            side: cfg.side,
            pair,
            start_stop_factor: cfg.start_percent / Decimal::ONE_HUNDRED,
            end_stop_factor: cfg.end_percent / Decimal::ONE_HUNDRED,
            max_loss_stop_factor: cfg.max_loss_percent / Decimal::ONE_HUNDRED,
            limit_sell_factor: cfg.limit_sell_percent / Decimal::ONE_HUNDRED,
            buy_price: cfg.buy_price,
            static_price: cfg.price,
            quantity: cfg.amount,
            last_stop,
            observed_high_price: Decimal::ZERO,
            coin_precision: None,
            protective_order_id: None,
        })
    }

    /// True until a sell stop has been committed.
    pub fn is_first_run(&self) -> bool {
        self.last_stop.is_zero()
    }

    /// Both trailing factors must be set for the trailing formula to apply.
    pub fn trailing_enabled(&self) -> bool {
        self.start_stop_factor > Decimal::ZERO && self.end_stop_factor > Decimal::ZERO
    }

    /// The protective limit order is only maintained before the first commit.
    pub fn protective_enabled(&self) -> bool {
        self.limit_sell_factor > Decimal::ZERO
    }

    /// Price of the protective limit sell.
    pub fn protective_price(&self) -> Decimal {
        self.buy_price * (Decimal::ONE + self.limit_sell_factor)
    }

    /// Piecewise-linear trailing stop for a single price.
    ///
    /// The stop-back percentage slides from `start_stop_factor` at
    /// `buy_price * (1 + start)` to `end_stop_factor` at the limit sell ceiling.
    pub fn stop_at(&self, price: Decimal) -> Decimal {
        let low = self.buy_price * (Decimal::ONE + self.start_stop_factor);
        let high = self.protective_price();

        if price <= low {
            return price * (Decimal::ONE - self.start_stop_factor);
        }
        if price >= high {
            return price * (Decimal::ONE - self.end_stop_factor);
        }

        let t = (price - low) / (high - low);
        let factor = self.start_stop_factor + t * (self.end_stop_factor - self.start_stop_factor);
        price * (Decimal::ONE - factor)
    }

    /// Trailing part of the sell stop; never below the committed stop.
    pub fn sell_stop(&self, price: Decimal) -> Decimal {
        if !self.trailing_enabled() {
            return self.static_price;
        }

        self.last_stop
            .max(self.stop_at(price))
            .max(self.stop_at(self.observed_high_price))
    }

    /// Loss floor relative to the buy price.
    pub fn floor_stop(&self) -> Decimal {
        if self.max_loss_stop_factor > Decimal::ZERO {
            self.buy_price * (Decimal::ONE - self.max_loss_stop_factor)
        } else {
            self.static_price
        }
    }

    /// Effective sell stop for the given market price.
    pub fn sell_trigger(&self, price: Decimal) -> Decimal {
        self.sell_stop(price).max(self.floor_stop())
    }

    /// Buy stop; never above the committed stop.
    pub fn buy_stop(&self, price: Decimal) -> Decimal {
        if !self.trailing_enabled() {
            return self.static_price;
        }

        self.last_stop
            .min(price * (Decimal::ONE + self.start_stop_factor))
    }

    /// Tracks the highest price seen.
    pub fn observe(&mut self, price: Decimal) {
        if price > self.observed_high_price {
            self.observed_high_price = price;
        }
    }

    /// Forgets the committed stop and the observed high.
    pub fn reset_stop(&mut self) {
        self.last_stop = Decimal::ZERO;
        self.observed_high_price = Decimal::ZERO;
    }

    /// Commits a new stop, returning true if it differs from the previous one.
    pub fn commit_stop(&mut self, stop: Decimal) -> bool {
        let changed = self.last_stop != stop;
        self.last_stop = stop;
        changed
    }

    /// Rounds a quantity down to the coin precision, if known.
    pub fn round_quantity(&self, quantity: Decimal) -> Decimal {
        match self.coin_precision {
            Some(dp) => quantity
                .round_dp_with_strategy(dp, RoundingStrategy::ToZero)
                .normalize(),
            None => quantity.normalize(),
        }
    }
}
