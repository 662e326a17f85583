//! Domain models for the trailing stop engine.

mod order;
mod pair;
mod position;

pub use order::{OrderSide, OrderStatus};
pub use pair::{Pair, PairError};
pub use position::Position;
