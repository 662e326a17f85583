//! Scripted exchange and recording notifier shared by unit tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromStr;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::domain::{OrderSide, Pair};
use crate::exchanges::{Balance, Exchange, ExchangeError, Result as ExchangeResult};
use crate::notification::{
    Event, EventData, EventType, ExecutionData, NotificationError, Notifier,
};

pub(crate) fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Balance(String),
    Price,
    Sell(Decimal),
    Buy(Decimal),
    Limit(Decimal, Decimal),
    Cancel(String),
    Running(String),
    Filled(String),
}

/// Exchange that replays a price script and records every call.
#[derive(Default)]
pub(crate) struct MockExchange {
    prices: Mutex<VecDeque<Decimal>>,
    balances: Mutex<HashMap<String, Balance>>,
    running: Mutex<HashSet<String>>,
    filled: Mutex<HashSet<String>>,
    fail_sell: bool,
    next_id: Mutex<u32>,
    calls: Mutex<Vec<Call>>,
}

impl MockExchange {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_prices(self, prices: &[&str]) -> Self {
        *self.prices.lock().unwrap() = prices.iter().map(|p| d(p)).collect();
        self
    }

    pub(crate) fn with_balance(self, coin: &str, free: &str, precision: u32) -> Self {
        self.balances.lock().unwrap().insert(
            coin.to_string(),
            Balance {
                free: d(free),
                precision,
            },
        );
        self
    }

    pub(crate) fn with_running(self, order_id: &str) -> Self {
        self.running.lock().unwrap().insert(order_id.to_string());
        self
    }

    pub(crate) fn failing_sell(mut self) -> Self {
        self.fail_sell = true;
        self
    }

    pub(crate) fn fill(&self, order_id: &str) {
        self.running.lock().unwrap().remove(order_id);
        self.filled.lock().unwrap().insert(order_id.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn position_of(&self, call: &Call) -> usize {
        self.calls()
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("{:?} was never made", call))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Exchange for MockExchange {
    fn name(&self) -> &str {
        "binance"
    }

    async fn get_balance(&self, coin: &str) -> ExchangeResult<Balance> {
        self.record(Call::Balance(coin.to_string()));
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(coin)
            .copied()
            .unwrap_or(Balance {
                free: Decimal::ZERO,
                precision: 8,
            }))
    }

    async fn get_market_price(&self, _pair: &Pair) -> ExchangeResult<Decimal> {
        self.record(Call::Price);
        self.prices
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ExchangeError::Connection("no price".into()))
    }

    async fn sell(&self, _pair: &Pair, quantity: Decimal) -> ExchangeResult<String> {
        self.record(Call::Sell(quantity));
        if self.fail_sell {
            return Err(ExchangeError::InsufficientFunds);
        }
        Ok("S1".to_string())
    }

    async fn buy(&self, _pair: &Pair, quantity: Decimal) -> ExchangeResult<String> {
        self.record(Call::Buy(quantity));
        Ok("B1".to_string())
    }

    async fn set_limit_order(
        &self,
        _side: OrderSide,
        _pair: &Pair,
        quantity: Decimal,
        price: Decimal,
    ) -> ExchangeResult<String> {
        self.record(Call::Limit(quantity, price));
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let order_id = format!("L{}", *next_id);
        self.running.lock().unwrap().insert(order_id.clone());
        Ok(order_id)
    }

    async fn cancel_limit_order(&self, order_id: &str, _pair: &Pair) -> ExchangeResult<()> {
        self.record(Call::Cancel(order_id.to_string()));
        self.running.lock().unwrap().remove(order_id);
        Ok(())
    }

    async fn is_limit_order_running(&self, order_id: &str, _pair: &Pair) -> ExchangeResult<bool> {
        self.record(Call::Running(order_id.to_string()));
        Ok(self.running.lock().unwrap().contains(order_id))
    }

    async fn is_limit_order_filled(&self, order_id: &str, _pair: &Pair) -> ExchangeResult<bool> {
        self.record(Call::Filled(order_id.to_string()));
        Ok(self.filled.lock().unwrap().contains(order_id))
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
}

impl RecordingNotifier {
    pub(crate) fn types(&self) -> Vec<EventType> {
        self.events.lock().unwrap().iter().map(|e| e.event_type).collect()
    }

    pub(crate) fn statuses(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match &e.data {
                EventData::Status(data) => Some(data.message.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn executions(&self) -> Vec<ExecutionData> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match &e.data {
                EventData::Execution(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn send_async(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn is_enabled(&self, _event_type: EventType) -> bool {
        true
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}
