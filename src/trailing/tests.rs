//! Stop engine scenarios against a scripted exchange.

use super::*;
use crate::domain::Pair;
use crate::notification::EventType;
use crate::storage::{LimitOrderRecord, new_cache_lock};
use crate::testing::{Call, MockExchange, RecordingNotifier, d};
use chrono::Duration;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    exchange: Arc<MockExchange>,
    notifier: Arc<RecordingNotifier>,
    stop_cache: StopCache,
    order_cache: OrderCache,
}

impl Harness {
    fn new(exchange: MockExchange) -> Self {
        let dir = TempDir::new().unwrap();
        let lock = new_cache_lock();
        Self {
            stop_cache: StopCache::new(dir.path().join(".cache.yaml"), lock.clone()),
            order_cache: OrderCache::new(dir.path().join(".market-cache.yaml"), lock),
            _dir: dir,
            exchange: Arc::new(exchange),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    async fn trailing(&self, position: Position) -> Trailing {
        let mut trailing = Trailing::new(
            position,
            self.exchange.clone(),
            self.notifier.clone(),
            self.stop_cache.clone(),
            self.order_cache.clone(),
        );
        trailing.restore().await;
        trailing
    }

    async fn cache_stop(&self, last_stop: &str, buy_price: &str, observed: &str, age_minutes: i64) {
        self.stop_cache
            .save(StopRecord {
                exchange: "binance".to_string(),
                pair: "BNB/USDT".to_string(),
                last_stop: d(last_stop),
                buy_price: d(buy_price),
                observed_high_price: d(observed),
                coin_precision: Some(3),
                updated: Utc::now() - Duration::minutes(age_minutes),
            })
            .await
            .unwrap();
    }

    async fn cache_order(&self, order_id: &str, quantity: &str, price: &str) {
        self.order_cache
            .save(LimitOrderRecord {
                order_id: order_id.to_string(),
                side: OrderSide::Sell,
                exchange: "binance".to_string(),
                pair: "BNB/USDT".to_string(),
                quantity: d(quantity),
                price: d(price),
                updated: Utc::now(),
            })
            .await
            .unwrap();
    }

    async fn cached_order(&self) -> Option<LimitOrderRecord> {
        self.order_cache.find("binance", "BNB/USDT", OrderSide::Sell).await
    }
}

fn sell_position() -> Position {
    Position {
        exchange: "binance".to_string(),
        side: OrderSide::Sell,
        pair: Pair::parse("BNB/USDT").unwrap(),
        start_stop_factor: d("0.01"),
        end_stop_factor: d("0.05"),
        max_loss_stop_factor: Decimal::ZERO,
        limit_sell_factor: d("0.10"),
        buy_price: d("100"),
        static_price: Decimal::ZERO,
        quantity: None,
        last_stop: Decimal::ZERO,
        observed_high_price: Decimal::ZERO,
        coin_precision: None,
        protective_order_id: None,
    }
}

fn unprotected_sell_position() -> Position {
    Position {
        limit_sell_factor: Decimal::ZERO,
        ..sell_position()
    }
}

fn buy_position() -> Position {
    Position {
        side: OrderSide::Buy,
        limit_sell_factor: Decimal::ZERO,
        buy_price: Decimal::ZERO,
        last_stop: Decimal::MAX,
        ..sell_position()
    }
}

// ==================== Sell side ====================

#[tokio::test]
async fn test_sell_ratchets_up_then_sells() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["101", "105", "108", "103"])
            .with_balance("BNB", "5", 3),
    );
    let mut trailing = h.trailing(sell_position()).await;

    let mut stops = Vec::new();
    for _ in 0..3 {
        assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);
        stops.push(trailing.position().last_stop);
    }
    assert!(stops[0] < stops[1] && stops[1] < stops[2], "stops {:?}", stops);
    assert_eq!(stops[0], d("99.99"));

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);

    let cancel = h.exchange.position_of(&Call::Cancel("L1".to_string()));
    let sell = h.exchange.position_of(&Call::Sell(d("5")));
    assert!(cancel < sell);
    assert!(h.cached_order().await.is_none());
    assert_eq!(h.notifier.executions()[0].order_id.as_deref(), Some("S1"));
}

#[tokio::test]
async fn test_sell_ratchet_is_non_decreasing() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["101", "106", "104", "109", "107", "112", "108"])
            .with_balance("BNB", "5", 3),
    );
    let mut trailing = h.trailing(sell_position()).await;

    let mut previous = Decimal::ZERO;
    for _ in 0..7 {
        assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);
        let stop = trailing.position().last_stop;
        assert!(stop >= previous, "stop went down from {} to {}", previous, stop);
        previous = stop;
    }
    assert!(!h.calls_contain_sell());
}

impl Harness {
    fn calls_contain_sell(&self) -> bool {
        self.exchange
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Sell(_)))
    }
}

#[tokio::test]
async fn test_stop_notified_only_when_it_moves() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["103", "102", "104"])
            .with_balance("BNB", "5", 3),
    );
    let mut trailing = h.trailing(unprotected_sell_position()).await;

    for _ in 0..3 {
        trailing.evaluate().await.unwrap();
    }

    let moves = h
        .notifier
        .types()
        .into_iter()
        .filter(|t| *t == EventType::StopChange)
        .count();
    assert_eq!(moves, 2);
}

#[tokio::test]
async fn test_max_loss_floor_sells_below_floor() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["98", "94"])
            .with_balance("BNB", "2", 3),
    );
    let mut position = unprotected_sell_position();
    position.max_loss_stop_factor = d("0.05");
    let mut trailing = h.trailing(position).await;

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);
    assert_eq!(trailing.position().last_stop, d("97.02"));
    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);
    h.exchange.position_of(&Call::Sell(d("2")));
}

#[tokio::test]
async fn test_sell_quantity_rounded_down_to_precision() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["101", "90"])
            .with_balance("BNB", "1.23456", 2),
    );
    let mut trailing = h.trailing(unprotected_sell_position()).await;

    trailing.evaluate().await.unwrap();
    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);
    h.exchange.position_of(&Call::Sell(d("1.23")));
}

#[tokio::test]
async fn test_sell_failure_is_still_terminal() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["101", "95"])
            .with_balance("BNB", "5", 3)
            .failing_sell(),
    );
    let mut trailing = h.trailing(unprotected_sell_position()).await;

    trailing.evaluate().await.unwrap();
    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);

    let executions = h.notifier.executions();
    assert_eq!(executions.len(), 1);
    assert!(executions[0].order_id.is_none());
    assert_eq!(executions[0].error.as_deref(), Some("insufficient funds"));
}

#[tokio::test]
async fn test_no_coins_ends_position() {
    let h = Harness::new(MockExchange::new().with_prices(&["101"]));
    let mut trailing = h.trailing(unprotected_sell_position()).await;

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);
    assert!(h.notifier.statuses()[0].contains("Cannot find any BNB coins"));
    assert!(!h.exchange.calls().contains(&Call::Price));
}

#[tokio::test]
async fn test_fixed_amount_above_balance_ends_position() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["101"])
            .with_balance("BNB", "5", 3),
    );
    let mut position = unprotected_sell_position();
    position.quantity = Some(d("10"));
    let mut trailing = h.trailing(position).await;

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);
    assert!(h.notifier.statuses()[0].contains("Amount is set to sell 10 coins"));
}

#[tokio::test]
async fn test_fixed_amount_within_balance_is_used() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["101", "90"])
            .with_balance("BNB", "5", 3),
    );
    let mut position = unprotected_sell_position();
    position.quantity = Some(d("2"));
    let mut trailing = h.trailing(position).await;

    trailing.evaluate().await.unwrap();
    assert!(h.notifier.statuses()[0].starts_with("Ready to sell 2 BNB"));
    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);
    h.exchange.position_of(&Call::Sell(d("2")));
}

#[tokio::test]
async fn test_price_error_is_transient() {
    let h = Harness::new(MockExchange::new().with_balance("BNB", "5", 3));
    let mut trailing = h.trailing(unprotected_sell_position()).await;

    let err = trailing.evaluate().await.unwrap_err();
    assert!(!err.is_fatal());
    assert!(trailing.position().is_first_run());

    trailing.report(&err);
    assert!(h.notifier.types().contains(&EventType::Error));
}

#[tokio::test]
async fn test_storage_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let exchange = Arc::new(
        MockExchange::new()
            .with_prices(&["101"])
            .with_balance("BNB", "5", 3),
    );
    let lock = new_cache_lock();
    let mut trailing = Trailing::new(
        unprotected_sell_position(),
        exchange,
        Arc::new(RecordingNotifier::default()),
        StopCache::new(dir.path().join("missing/.cache.yaml"), lock.clone()),
        OrderCache::new(dir.path().join(".market-cache.yaml"), lock),
    );

    let err = trailing.evaluate().await.unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_stop_cache_written_after_evaluation() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["101"])
            .with_balance("BNB", "5", 3),
    );
    let mut trailing = h.trailing(unprotected_sell_position()).await;
    trailing.evaluate().await.unwrap();

    let record = h.stop_cache.load("binance", "BNB/USDT", d("100")).await.unwrap();
    assert_eq!(record.last_stop, d("99.99"));
    assert_eq!(record.observed_high_price, d("101"));
    assert_eq!(record.coin_precision, Some(3));
}

// ==================== Cache adoption ====================

#[tokio::test]
async fn test_cached_stop_adopted_on_first_run() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["103"])
            .with_balance("BNB", "5", 3),
    );
    h.cache_stop("99", "100", "105", 5).await;
    let mut trailing = h.trailing(unprotected_sell_position()).await;

    assert_eq!(trailing.position().coin_precision, Some(3));
    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);
    assert_eq!(trailing.position().last_stop, d("99.75"));
    assert!(h.notifier.statuses().iter().all(|s| !s.contains("Preventing")));
}

#[tokio::test]
async fn test_first_run_guard_discards_unsafe_cached_stop() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["103"])
            .with_balance("BNB", "5", 3),
    );
    h.cache_stop("104", "100", "109", 5).await;
    let mut trailing = h.trailing(unprotected_sell_position()).await;

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);

    assert!(!h.calls_contain_sell());
    assert!(h.notifier.statuses().iter().any(|s| s.contains("Preventing sell")));
    assert_eq!(trailing.position().last_stop, d("97.85"));
    assert_eq!(trailing.position().observed_high_price, d("103"));
}

#[tokio::test]
async fn test_first_run_guard_discards_restored_high_without_stop() {
    // A run that sold on its first tick leaves last_stop 0 but a high observed price.
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["105"])
            .with_balance("BNB", "5", 3),
    );
    h.cache_stop("0", "100", "120", 5).await;
    let mut trailing = h.trailing(unprotected_sell_position()).await;

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);

    assert!(!h.calls_contain_sell());
    assert!(h.notifier.statuses().iter().any(|s| s.contains("Preventing sell")));
    assert_eq!(trailing.position().last_stop, d("99.75"));
    assert_eq!(trailing.position().observed_high_price, d("105"));
}

#[tokio::test]
async fn test_first_run_guard_applies_once() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["105", "99"])
            .with_balance("BNB", "5", 3),
    );
    h.cache_stop("0", "100", "120", 5).await;
    let mut trailing = h.trailing(unprotected_sell_position()).await;

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);
    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);

    h.exchange.position_of(&Call::Sell(d("5")));
    let guards = h
        .notifier
        .statuses()
        .iter()
        .filter(|s| s.contains("Preventing sell"))
        .count();
    assert_eq!(guards, 1);
}

#[tokio::test]
async fn test_stale_cached_stop_never_adopted() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["103"])
            .with_balance("BNB", "5", 3),
    );
    h.cache_stop("104", "100", "109", 61).await;
    let mut trailing = h.trailing(unprotected_sell_position()).await;

    trailing.evaluate().await.unwrap();

    assert!(h.notifier.statuses().iter().all(|s| !s.contains("Preventing")));
    assert_eq!(trailing.position().last_stop, d("97.85"));
}

#[tokio::test]
async fn test_cached_stop_for_other_buy_price_never_adopted() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["103"])
            .with_balance("BNB", "5", 3),
    );
    h.cache_stop("104", "90", "109", 5).await;
    let mut trailing = h.trailing(unprotected_sell_position()).await;

    trailing.evaluate().await.unwrap();

    assert!(h.notifier.statuses().iter().all(|s| !s.contains("Preventing")));
    assert_eq!(trailing.position().last_stop, d("97.85"));
}

// ==================== Protective limit order ====================

#[tokio::test]
async fn test_protective_order_placed_and_cached() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["101"])
            .with_balance("BNB", "5", 3),
    );
    let mut trailing = h.trailing(sell_position()).await;

    trailing.evaluate().await.unwrap();

    h.exchange.position_of(&Call::Limit(d("5"), d("110")));
    let record = h.cached_order().await.unwrap();
    assert_eq!(record.order_id, "L1");
    assert_eq!(trailing.position().protective_order_id.as_deref(), Some("L1"));
    assert!(h.notifier.types().contains(&EventType::LimitOrder));
}

#[tokio::test]
async fn test_protective_order_replaced_when_target_changes() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["105"])
            .with_balance("BNB", "0", 3)
            .with_running("OLD"),
    );
    h.cache_order("OLD", "5", "110").await;
    let mut position = sell_position();
    position.limit_sell_factor = d("0.12");
    let mut trailing = h.trailing(position).await;

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);

    let cancel = h.exchange.position_of(&Call::Cancel("OLD".to_string()));
    let create = h.exchange.position_of(&Call::Limit(d("5"), d("112")));
    let price = h.exchange.position_of(&Call::Price);
    assert!(cancel < create && create < price);

    let record = h.cached_order().await.unwrap();
    assert_eq!(record.order_id, "L1");
    assert_eq!(record.price, d("112"));
}

#[tokio::test]
async fn test_matching_protective_order_is_adopted() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["105"])
            .with_running("KEEP"),
    );
    h.cache_order("KEEP", "5", "110").await;
    let mut trailing = h.trailing(sell_position()).await;

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);

    assert_eq!(trailing.position().protective_order_id.as_deref(), Some("KEEP"));
    assert!(!h
        .exchange
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Limit(..) | Call::Cancel(_))));
}

#[tokio::test]
async fn test_dead_protective_order_is_recreated() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["105"])
            .with_balance("BNB", "5", 3),
    );
    h.cache_order("GONE", "5", "110").await;
    let mut trailing = h.trailing(sell_position()).await;

    trailing.evaluate().await.unwrap();

    assert!(!h.exchange.calls().contains(&Call::Cancel("GONE".to_string())));
    h.exchange.position_of(&Call::Limit(d("5"), d("110")));
    assert_eq!(h.cached_order().await.unwrap().order_id, "L1");
}

#[tokio::test]
async fn test_filled_protective_order_ends_position() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["101", "111"])
            .with_balance("BNB", "5", 3),
    );
    let mut trailing = h.trailing(sell_position()).await;

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);
    h.exchange.fill("L1");
    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);

    assert!(!h.calls_contain_sell());
    assert!(h.cached_order().await.is_none());
    assert!(h.notifier.statuses().iter().any(|s| s.contains("L1 filled")));
}

#[tokio::test]
async fn test_protective_order_not_rechecked_after_first_commit() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["101", "105", "100"])
            .with_balance("BNB", "5", 3),
    );
    let mut trailing = h.trailing(sell_position()).await;

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);
    let first_price = h.exchange.position_of(&Call::Price);
    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);
    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);

    let later = h.exchange.calls()[first_price + 1..].to_vec();
    assert!(
        !later
            .iter()
            .any(|c| matches!(c, Call::Running(_) | Call::Balance(_) | Call::Limit(..))),
        "unexpected calls after first commit: {:?}",
        later
    );
    h.exchange.position_of(&Call::Sell(d("5")));
}

// ==================== Buy side ====================

#[tokio::test]
async fn test_buy_static_price_compares_directly() {
    let h = Harness::new(MockExchange::new().with_prices(&["8500", "8800", "9100"]));
    let mut position = buy_position();
    position.pair = Pair::parse("BTC/USDT").unwrap();
    position.start_stop_factor = Decimal::ZERO;
    position.end_stop_factor = Decimal::ZERO;
    position.static_price = d("9000");
    position.quantity = Some(d("0.5"));
    let mut trailing = h.trailing(position).await;

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);
    assert_eq!(trailing.position().last_stop, d("9000"));
    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);
    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);

    h.exchange.position_of(&Call::Buy(d("0.5")));
}

#[tokio::test]
async fn test_buy_ratchet_is_non_increasing_then_buys() {
    let h = Harness::new(
        MockExchange::new()
            .with_prices(&["100", "98", "98.5", "97", "99"])
            .with_balance("USDT", "1000", 2)
            .with_balance("BNB", "0", 3),
    );
    let mut trailing = h.trailing(buy_position()).await;

    let mut previous = Decimal::MAX;
    for _ in 0..4 {
        assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Continue);
        let stop = trailing.position().last_stop;
        assert!(stop <= previous, "stop went up from {} to {}", previous, stop);
        previous = stop;
    }
    assert_eq!(previous, d("97.97"));

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);
    h.exchange.position_of(&Call::Buy(d("10.101")));
}

#[tokio::test]
async fn test_buy_without_quote_balance_ends_position() {
    let h = Harness::new(MockExchange::new().with_prices(&["100"]));
    let mut position = buy_position();
    position.static_price = d("90");
    position.start_stop_factor = Decimal::ZERO;
    let mut trailing = h.trailing(position).await;

    assert_eq!(trailing.evaluate().await.unwrap(), Verdict::Terminal);
    assert!(!h.exchange.calls().iter().any(|c| matches!(c, Call::Buy(_))));
}

#[tokio::test]
async fn test_buy_never_touches_stop_cache() {
    let h = Harness::new(MockExchange::new().with_prices(&["100"]));
    let mut trailing = h.trailing(buy_position()).await;

    trailing.evaluate().await.unwrap();

    assert!(h.stop_cache.load("binance", "BNB/USDT", Decimal::ZERO).await.is_none());
}

#[test]
fn test_label() {
    let dir = TempDir::new().unwrap();
    let lock = new_cache_lock();
    let trailing = Trailing::new(
        sell_position(),
        Arc::new(MockExchange::new()),
        Arc::new(RecordingNotifier::default()),
        StopCache::new(dir.path().join("a"), lock.clone()),
        OrderCache::new(dir.path().join("b"), lock),
    );
    assert_eq!(trailing.label(), "SELL BNB/USDT on binance");
}
