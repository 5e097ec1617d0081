use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use optrade_core::candle::{Candle, CandleWindow};
use optrade_core::clock::Clock;
use optrade_core::config::{PaperConfig, RetryConfig};
use optrade_core::contract::{InstrumentKey, OptionContract};
use optrade_core::error::{BrokerError, BrokerResult, EngineError};
use optrade_core::events::{EntryOrder, ExitOrder, OptionType, OrderId, TradeAction};
use optrade_core::position::Position;
use optrade_core::subscription::{BrokerId, StrategyKind, Subscription};
use optrade_core::traits::BrokerAdapter;
use optrade_orchestrator::cycle::{run_cycle, CycleContext};
use optrade_orchestrator::{start, BrokerSet, EngineEvent, EngineSettings, EngineSnapshot, EngineState, SchedulerHandle};
use optrade_paper::{paper_key, PaperBroker};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Clock the test moves by hand.
struct ManualClock(Mutex<NaiveDateTime>);

impl ManualClock {
    fn at(now: NaiveDateTime) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    fn set(&self, now: NaiveDateTime) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
struct MockBroker {
    candles: Mutex<HashMap<InstrumentKey, Vec<Candle>>>,
    positions: Mutex<Vec<Position>>,
    unknown: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<InstrumentKey>>,
    rejecting: Mutex<HashSet<String>>,
    entries: Mutex<Vec<EntryOrder>>,
    exits: Mutex<Vec<ExitOrder>>,
}

fn mock_key(symbol: &str) -> InstrumentKey {
    InstrumentKey::new(format!("MOCK|{symbol}"))
}

impl MockBroker {
    fn with_candles(self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.candles.lock().unwrap().insert(mock_key(symbol), candles);
        self
    }

    fn with_position(self, trading_symbol: &str, quantity: i64) -> Self {
        self.positions.lock().unwrap().push(Position {
            trading_symbol: trading_symbol.to_string(),
            instrument_key: mock_key(trading_symbol),
            quantity,
            average_price: dec!(90),
            last_price: dec!(95),
        });
        self
    }

    fn unknown(self, symbol: &str) -> Self {
        self.unknown.lock().unwrap().insert(symbol.to_string());
        self
    }

    fn failing(self, symbol: &str) -> Self {
        self.failing.lock().unwrap().insert(mock_key(symbol));
        self
    }

    /// Exit orders for this contract are rejected.
    fn rejecting_exit(self, trading_symbol: &str) -> Self {
        self.rejecting.lock().unwrap().insert(trading_symbol.to_string());
        self
    }
}

#[async_trait]
impl BrokerAdapter for MockBroker {
    fn name(&self) -> &str {
        "mock"
    }

    async fn resolve_instrument(&self, symbol: &str) -> BrokerResult<InstrumentKey> {
        if self.unknown.lock().unwrap().contains(symbol) {
            return Err(BrokerError::NotFound(symbol.to_string()));
        }
        Ok(mock_key(symbol))
    }

    async fn fetch_candles(
        &self,
        key: &InstrumentKey,
        _interval_minutes: u32,
        window: CandleWindow,
    ) -> BrokerResult<Vec<Candle>> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(BrokerError::api(503, "upstream unavailable"));
        }
        match window {
            CandleWindow::Historical { .. } => {
                Ok(self.candles.lock().unwrap().get(key).cloned().unwrap_or_default())
            }
            CandleWindow::Intraday => Ok(Vec::new()),
        }
    }

    async fn fetch_positions(&self) -> BrokerResult<Vec<Position>> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn place_entry_order(&self, order: &EntryOrder) -> BrokerResult<OrderId> {
        let mut entries = self.entries.lock().unwrap();
        entries.push(order.clone());
        Ok(OrderId(format!("E{}", entries.len())))
    }

    async fn place_exit_order(&self, order: &ExitOrder) -> BrokerResult<OrderId> {
        if self.rejecting.lock().unwrap().contains(&order.trading_symbol) {
            return Err(BrokerError::Rejected("margin".to_string()));
        }
        let mut exits = self.exits.lock().unwrap();
        exits.push(order.clone());
        Ok(OrderId(format!("X{}", exits.len())))
    }

    async fn select_option_contract(
        &self,
        underlying: &str,
        spot: Decimal,
        option_type: OptionType,
        _now: NaiveDateTime,
    ) -> BrokerResult<OptionContract> {
        let strike = spot.round();
        let trading_symbol = format!("{underlying}{strike}{}", option_type.suffix());
        Ok(OptionContract {
            instrument_key: mock_key(&trading_symbol),
            trading_symbol,
            underlying: underlying.to_string(),
            option_type,
            strike,
            expiry: NaiveDate::from_ymd_opt(2025, 3, 13).unwrap(),
            lot_size: 75,
            tick_size: dec!(0.05),
        })
    }

    async fn last_price(&self, _key: &InstrumentKey) -> BrokerResult<Decimal> {
        Ok(dec!(100))
    }
}

fn at(day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, day)
        .unwrap()
        .and_hms_opt(hour, minute, second)
        .unwrap()
}

/// Steady uptrend from the previous session: fast EMA over slow EMA with
/// Supertrend below close.
fn rising(base: i64, count: i64) -> Vec<Candle> {
    let start = at(7, 9, 15, 0);
    (0..count)
        .map(|i| {
            let close = Decimal::from(base + i);
            Candle::new(
                start + Duration::minutes(5 * i),
                close - dec!(0.25),
                close + dec!(0.5),
                close - dec!(0.5),
                close,
            )
        })
        .collect()
}

fn settings() -> EngineSettings {
    EngineSettings {
        max_consecutive_failures: 2,
        adapter_timeout: std::time::Duration::from_secs(5),
        retry: RetryConfig {
            max_attempts: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        },
        ..EngineSettings::default()
    }
}

fn subscription(symbol: &str, broker: BrokerId) -> Subscription {
    Subscription::new(symbol, broker, StrategyKind::Ema10Ema20Supertrend, 5, 1, dec!(10))
}

fn resolved(symbol: &str) -> Subscription {
    let mut sub = subscription(symbol, BrokerId::Upstox);
    sub.instrument_key = Some(mock_key(symbol));
    sub
}

fn context(broker: MockBroker) -> (Arc<MockBroker>, CycleContext) {
    let broker = Arc::new(broker);
    let brokers = BrokerSet::new().with(BrokerId::Upstox, broker.clone());
    (broker, CycleContext::new(brokers, settings(), CancellationToken::new()))
}

fn drain(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Moves the clock and lets the scheduler observe it. The first command
/// wakes the loop, the second is only served once any due cycle has run.
async fn advance(handle: &SchedulerHandle, clock: &ManualClock, to: NaiveDateTime) -> EngineSnapshot {
    clock.set(to);
    handle.snapshot().await.unwrap();
    handle.snapshot().await.unwrap()
}

#[tokio::test]
async fn test_only_one_entry_per_cycle_across_symbols() {
    let (broker, ctx) = context(
        MockBroker::default()
            .with_candles("NIFTY", rising(22400, 80))
            .with_candles("BANKNIFTY", rising(48000, 80)),
    );

    let due = [resolved("NIFTY"), resolved("BANKNIFTY")];
    let outcomes = run_cycle(&ctx, &due, at(10, 10, 5, 1)).await;

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.decision.as_ref().unwrap().action, TradeAction::EnterCall);
    }

    let entries = broker.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].trading_symbol.starts_with("NIFTY"));
    assert_eq!(entries[0].quantity, 75);
    assert_eq!(entries[0].reference_price, dec!(100));
    assert_eq!(entries[0].target_price, dec!(110));

    assert!(outcomes[1]
        .events
        .iter()
        .any(|e| matches!(e, EngineEvent::EntrySkipped { symbol, .. } if symbol == "BANKNIFTY")));
}

#[tokio::test]
async fn test_open_put_is_exited_when_trend_turns_up() {
    let (broker, ctx) = context(
        MockBroker::default()
            .with_candles("NIFTY", rising(22400, 80))
            .with_position("NIFTY25MAR22500PE", 75)
            .with_position("BANKNIFTY25MAR48000CE", 30),
    );

    let outcomes = run_cycle(&ctx, &[resolved("NIFTY")], at(10, 10, 5, 1)).await;
    assert_eq!(outcomes[0].decision.as_ref().unwrap().action, TradeAction::ExitPut);

    let exits = broker.exits.lock().unwrap().clone();
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].trading_symbol, "NIFTY25MAR22500PE");
    assert_eq!(exits[0].quantity, 75);
    assert_eq!(exits[0].price, dec!(100));
    assert!(broker.entries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_exit_keeps_legs_already_sold() {
    let (broker, ctx) = context(
        MockBroker::default()
            .with_candles("NIFTY", rising(22400, 80))
            .with_position("NIFTY25MAR22500PE", 75)
            .with_position("NIFTY25MAR22600PE", 75)
            .with_position("NIFTY25MAR22700PE", 75)
            .rejecting_exit("NIFTY25MAR22600PE"),
    );

    let outcomes = run_cycle(&ctx, &[resolved("NIFTY")], at(10, 10, 5, 1)).await;
    let outcome = &outcomes[0];
    assert_eq!(outcome.decision.as_ref().unwrap().action, TradeAction::ExitPut);
    assert!(matches!(
        outcome.result,
        Err(EngineError::Adapter { operation: "place_exit_order", .. })
    ));

    // Legs before and after the rejected one were still sold and reported.
    let exits = broker.exits.lock().unwrap().clone();
    let sold: Vec<&str> = exits.iter().map(|e| e.trading_symbol.as_str()).collect();
    assert_eq!(sold, vec!["NIFTY25MAR22500PE", "NIFTY25MAR22700PE"]);

    let reported: Vec<&str> = outcome
        .events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::ExitPlaced { trading_symbol, .. } => Some(trading_symbol.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(reported, sold);
}

#[tokio::test]
async fn test_close_positions_reports_partial_success() {
    let broker = Arc::new(
        MockBroker::default()
            .with_position("NIFTY25MAR22500CE", 75)
            .with_position("NIFTY25MAR22600CE", 75)
            .rejecting_exit("NIFTY25MAR22600CE"),
    );
    let brokers = BrokerSet::new().with(BrokerId::Upstox, broker.clone());
    let clock = ManualClock::at(at(10, 10, 2, 0));
    let mut engine = start(
        settings(),
        vec![subscription("NIFTY", BrokerId::Upstox)],
        brokers,
        clock,
    )
    .unwrap();

    let report = engine.handle.close_positions(Some("NIFTY")).await.unwrap();
    assert_eq!(report.closed.len(), 1);
    assert_eq!(report.closed[0].trading_symbol, "NIFTY25MAR22500CE");
    assert_eq!(report.closed[0].order_id, OrderId("X1".to_string()));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "NIFTY");
    assert!(report.failures[0].message.contains("margin"));
    assert_eq!(broker.exits.lock().unwrap().len(), 1);

    let events = drain(&mut engine.events);
    assert!(events.iter().any(
        |e| matches!(e, EngineEvent::ExitPlaced { trading_symbol, .. } if trading_symbol == "NIFTY25MAR22500CE")
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::Error { message, .. } if message.contains("margin"))));

    engine.handle.shutdown().await;
    engine.task.await.unwrap();
}

#[tokio::test]
async fn test_close_positions_fails_when_no_leg_closes() {
    let broker = Arc::new(
        MockBroker::default()
            .with_position("NIFTY25MAR22500CE", 75)
            .rejecting_exit("NIFTY25MAR22500CE"),
    );
    let brokers = BrokerSet::new().with(BrokerId::Upstox, broker);
    let clock = ManualClock::at(at(10, 10, 2, 0));
    let engine = start(
        settings(),
        vec![subscription("NIFTY", BrokerId::Upstox)],
        brokers,
        clock,
    )
    .unwrap();

    let err = engine.handle.close_positions(None).await.unwrap_err();
    assert!(err.to_string().contains("margin"));

    engine.handle.shutdown().await;
    engine.task.await.unwrap();
}

#[tokio::test]
async fn test_failing_symbol_does_not_block_others() {
    let (broker, ctx) = context(
        MockBroker::default()
            .with_candles("NIFTY", rising(22400, 80))
            .with_candles("BANKNIFTY", rising(48000, 80))
            .failing("NIFTY"),
    );

    let outcomes = run_cycle(&ctx, &[resolved("NIFTY"), resolved("BANKNIFTY")], at(10, 10, 5, 1)).await;

    assert!(matches!(
        outcomes[0].result,
        Err(EngineError::Adapter { operation: "fetch_candles", .. })
    ));
    assert!(outcomes[0].decision.is_none());
    assert!(outcomes[1].result.is_ok());

    let entries = broker.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].trading_symbol.starts_with("BANKNIFTY"));
}

#[tokio::test]
async fn test_short_history_skips_the_cycle() {
    let (_broker, ctx) = context(MockBroker::default().with_candles("NIFTY", rising(22400, 5)));

    let outcomes = run_cycle(&ctx, &[resolved("NIFTY")], at(10, 10, 5, 1)).await;
    assert!(matches!(outcomes[0].result, Err(EngineError::DataUnavailable { .. })));
    assert!(!outcomes[0].result.as_ref().unwrap_err().counts_as_failure());
}

#[tokio::test]
async fn test_start_rejects_duplicates_and_unconnected_brokers() {
    let brokers = BrokerSet::new().with(BrokerId::Upstox, Arc::new(MockBroker::default()));
    let clock = ManualClock::at(at(10, 10, 2, 0));

    let duplicated = vec![
        subscription("NIFTY", BrokerId::Upstox),
        subscription("NIFTY", BrokerId::Upstox),
    ];
    let err = start(settings(), duplicated, brokers.clone(), clock.clone()).err().unwrap();
    assert!(err.to_string().contains("more than once"));

    let unconnected = vec![subscription("NIFTY", BrokerId::Zerodha)];
    let err = start(settings(), unconnected, brokers, clock).err().unwrap();
    assert!(err.to_string().contains("not connected"));
}

#[tokio::test]
async fn test_unresolvable_symbol_is_deactivated_at_start() {
    let broker = Arc::new(
        MockBroker::default()
            .with_candles("NIFTY", rising(22400, 80))
            .unknown("NOPE"),
    );
    let brokers = BrokerSet::new().with(BrokerId::Upstox, broker);
    let clock = ManualClock::at(at(10, 10, 2, 0));
    let mut engine = start(
        settings(),
        vec![subscription("NOPE", BrokerId::Upstox), subscription("NIFTY", BrokerId::Upstox)],
        brokers,
        clock,
    )
    .unwrap();

    let snapshot = engine.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.active_symbols(), vec!["NIFTY"]);
    assert!(snapshot.status("NOPE").is_none());
    let nope = snapshot.deactivated("NOPE").unwrap();
    assert!(nope.deactivation_reason.as_ref().unwrap().contains("instrument resolution failed"));
    assert_eq!(snapshot.status("NIFTY").unwrap().instrument_key.as_deref(), Some("MOCK|NIFTY"));

    let events = drain(&mut engine.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::Deactivated { symbol, .. } if symbol == "NOPE")));

    engine.handle.shutdown().await;
    engine.task.await.unwrap();
    assert_eq!(engine.handle.state(), EngineState::Stopped);
}

#[tokio::test]
async fn test_cycle_runs_once_per_bucket_and_records_decision() {
    let broker = Arc::new(MockBroker::default().with_candles("NIFTY", rising(22400, 80)));
    let brokers = BrokerSet::new().with(BrokerId::Upstox, broker.clone());
    let clock = ManualClock::at(at(10, 10, 2, 0));
    let mut engine = start(
        settings(),
        vec![subscription("NIFTY", BrokerId::Upstox)],
        brokers,
        clock.clone(),
    )
    .unwrap();

    // Still inside the bucket the engine started in.
    let snapshot = advance(&engine.handle, &clock, at(10, 10, 4, 59)).await;
    assert!(snapshot.status("NIFTY").unwrap().last_decision.is_none());
    assert_eq!(snapshot.state, EngineState::Running);

    let snapshot = advance(&engine.handle, &clock, at(10, 10, 5, 1)).await;
    let status = snapshot.status("NIFTY").unwrap();
    assert_eq!(status.last_bucket, Some(at(10, 10, 5, 0)));
    assert_eq!(status.last_decision.as_ref().unwrap().action, TradeAction::EnterCall);
    assert_eq!(broker.entries.lock().unwrap().len(), 1);

    // Same bucket again: nothing new runs.
    advance(&engine.handle, &clock, at(10, 10, 7, 30)).await;
    assert_eq!(broker.entries.lock().unwrap().len(), 1);

    let events = drain(&mut engine.events);
    let started = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::CycleStarted { .. }))
        .count();
    assert_eq!(started, 1);
    assert!(events.iter().any(|e| matches!(e, EngineEvent::EntryPlaced { .. })));

    engine.handle.shutdown().await;
    engine.task.await.unwrap();
}

#[tokio::test]
async fn test_repeated_adapter_failures_deactivate() {
    let broker = Arc::new(MockBroker::default().failing("NIFTY"));
    let brokers = BrokerSet::new().with(BrokerId::Upstox, broker);
    let clock = ManualClock::at(at(10, 10, 2, 0));
    let engine = start(
        settings(),
        vec![subscription("NIFTY", BrokerId::Upstox)],
        brokers,
        clock.clone(),
    )
    .unwrap();

    let snapshot = advance(&engine.handle, &clock, at(10, 10, 5, 1)).await;
    let status = snapshot.status("NIFTY").unwrap();
    assert!(status.active);
    assert_eq!(status.consecutive_failures, 1);

    let snapshot = advance(&engine.handle, &clock, at(10, 10, 10, 1)).await;
    assert!(snapshot.subscriptions.is_empty());
    let status = snapshot.deactivated("NIFTY").unwrap();
    assert!(!status.active);
    assert!(status
        .deactivation_reason
        .as_ref()
        .unwrap()
        .starts_with("2 consecutive failed cycles"));

    assert_eq!(engine.handle.wait_until_done().await.unwrap(), EngineState::Idle);

    // Idle still answers commands.
    assert!(engine.handle.deactivate("NIFTY").await.is_err());
    engine.handle.shutdown().await;
    engine.task.await.unwrap();
}

#[tokio::test]
async fn test_activate_and_deactivate_at_runtime() {
    let broker = Arc::new(
        MockBroker::default()
            .with_candles("NIFTY", rising(22400, 80))
            .unknown("NOPE"),
    );
    let brokers = BrokerSet::new().with(BrokerId::Upstox, broker);
    let clock = ManualClock::at(at(10, 10, 2, 0));
    let engine = start(settings(), Vec::new(), brokers, clock).unwrap();
    assert_eq!(engine.handle.wait_until_done().await.unwrap(), EngineState::Idle);

    assert!(engine.handle.activate(subscription("NOPE", BrokerId::Upstox)).await.is_err());
    assert!(engine.handle.activate(subscription("NIFTY", BrokerId::Groww)).await.is_err());

    engine.handle.activate(subscription("NIFTY", BrokerId::Upstox)).await.unwrap();
    let snapshot = engine.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.active_symbols(), vec!["NIFTY"]);
    assert_eq!(snapshot.state, EngineState::Running);

    engine.handle.deactivate("NIFTY").await.unwrap();
    let snapshot = engine.handle.snapshot().await.unwrap();
    assert!(snapshot.subscriptions.is_empty());
    assert_eq!(
        snapshot.deactivated("NIFTY").unwrap().deactivation_reason.as_deref(),
        Some("deactivated on request")
    );

    // Reactivating takes the symbol out of the deactivated list again.
    engine.handle.activate(subscription("NIFTY", BrokerId::Upstox)).await.unwrap();
    let snapshot = engine.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.active_symbols(), vec!["NIFTY"]);
    assert!(snapshot.recently_deactivated.is_empty());

    engine.handle.shutdown().await;
    engine.task.await.unwrap();
    assert!(engine.handle.snapshot().await.is_err());
}

#[tokio::test]
async fn test_close_positions_through_paper_broker() {
    let paper = Arc::new(PaperBroker::new(&PaperConfig::default()));
    paper.seed_candles("NIFTY", rising(22400, 20));
    paper.open_position(Position {
        trading_symbol: "NIFTY22450PE".to_string(),
        instrument_key: paper_key("NIFTY22450PE"),
        quantity: 75,
        average_price: dec!(120),
        last_price: dec!(131.25),
    });

    let brokers = BrokerSet::new().with(BrokerId::Paper, paper.clone());
    let clock = ManualClock::at(at(10, 10, 2, 0));
    let engine = start(
        settings(),
        vec![subscription("NIFTY", BrokerId::Paper)],
        brokers,
        clock,
    )
    .unwrap();

    assert!(engine.handle.close_positions(Some("BANKNIFTY")).await.is_err());

    let report = engine.handle.close_positions(Some("NIFTY")).await.unwrap();
    assert!(report.failures.is_empty());
    let closed = report.closed;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].trading_symbol, "NIFTY22450PE");
    assert_eq!(closed[0].price, Decimal::ZERO);
    assert_eq!(paper.fills()[0].price, dec!(131.25));

    let err = engine.handle.close_positions(None).await.unwrap_err();
    assert!(err.to_string().contains("no open positions"));

    engine.handle.shutdown().await;
    engine.task.await.unwrap();
}
