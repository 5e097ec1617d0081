//! Replays synthetic sessions through the pipeline and the decision engine
//! one candle at a time, the way the scheduler sees them.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use optrade_core::candle::{Candle, CandleSeries};
use optrade_core::contract::InstrumentKey;
use optrade_core::events::TradeAction;
use optrade_core::position::{reconcile, Position, PositionState};
use optrade_core::subscription::StrategyKind;
use optrade_strategy::indicators::{self, IndicatorRow};
use optrade_strategy::{decide, decide_action};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 10)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap()
}

/// Rows 1-20 flat at 100, rows 21-30 ramping by 2 up to 120.
fn flat_then_ramp() -> Vec<Candle> {
    (0..30)
        .map(|i| {
            let close = if i < 20 {
                dec!(100)
            } else {
                dec!(100) + Decimal::from(2 * (i - 19))
            };
            Candle::new(
                start() + Duration::minutes(5 * i64::from(i)),
                close,
                close + dec!(0.5),
                close - dec!(0.5),
                close,
            )
        })
        .collect()
}

#[test]
fn strategy_b_holds_through_flat_rows_then_enters_call() {
    let candles = flat_then_ramp();
    let mut state = PositionState::Flat;
    let mut entries = Vec::new();

    for rows in 1..=candles.len() {
        let series = CandleSeries::from_candles(candles[..rows].iter().copied());
        let Some(row) = indicators::latest(&series) else {
            assert!(rows <= 20, "row {rows} should be fully defined");
            continue;
        };

        let intent = decide(
            "NIFTY",
            StrategyKind::Ema10Ema20Supertrend,
            &row,
            state,
            dec!(10),
            dec!(0.05),
        );

        if intent.action == TradeAction::EnterCall {
            entries.push((rows, intent.clone()));
            state = PositionState::LongCall;
        } else {
            assert_eq!(intent.action, TradeAction::Hold, "row {rows}");
        }
    }

    assert_eq!(entries.len(), 1);
    let (row_number, intent) = &entries[0];
    assert_eq!(*row_number, 21);
    assert_eq!(intent.reference_price, dec!(102));
    assert_eq!(intent.target_price, Some(dec!(112.20)));
    assert_eq!(
        serde_json::to_value(intent.action).unwrap(),
        serde_json::json!("ENTER_CALL")
    );
}

#[test]
fn first_defined_row_after_the_ramp_starts() {
    let candles = flat_then_ramp();
    let rows = indicators::compute(&CandleSeries::from_candles(candles[..21].iter().copied()));

    assert_eq!(rows.len(), 1);
    let row = rows[0];
    assert_eq!(row.close, dec!(102));
    assert_eq!(row.ema_fast, dec!(100.36));
    assert_eq!(row.ema_slow, dec!(100.19));
    assert_eq!(row.supertrend, dec!(98.36));
}

#[test]
fn open_call_exits_under_strategy_a_without_new_entry() {
    let positions = vec![Position {
        trading_symbol: "NIFTY25MAR22500CE".to_string(),
        instrument_key: InstrumentKey::new("NSE_FO|45450"),
        quantity: 75,
        average_price: dec!(110),
        last_price: dec!(96.5),
    }];
    let book = reconcile("NIFTY", &positions);
    assert_eq!(book.state(), PositionState::LongCall);

    let row = IndicatorRow {
        timestamp: start(),
        open: dec!(22510),
        high: dec!(22515),
        low: dec!(22440),
        close: dec!(22450),
        supertrend: dec!(22480),
        macd: dec!(3.9),
        macd_signal: dec!(4.1),
        macd_hist: dec!(-0.2),
        adx: dec!(28),
        adx_ema21: dec!(24),
        willr14: dec!(-82.5),
        ema_fast: dec!(22470),
        ema_slow: dec!(22460),
    };

    let intent = decide(
        "NIFTY",
        StrategyKind::AdxMacdWillRSupertrend,
        &row,
        book.state(),
        dec!(10),
        dec!(0.05),
    );
    assert_eq!(intent.action, TradeAction::ExitCall);
    assert_eq!(intent.target_price, None);

    // The same row from flat would be a put entry; holding a call blocks it.
    assert_eq!(
        decide_action(StrategyKind::AdxMacdWillRSupertrend, &row, PositionState::Flat),
        TradeAction::EnterPut
    );
}

#[test]
fn supertrend_flips_on_the_breakout_row() {
    // Ten quiet rows around 100, then a close far above the previous upper
    // band after a bearish break.
    let mut closes = vec![dec!(100); 10];
    closes.push(dec!(90));
    closes.extend([dec!(90); 4]);
    closes.push(dec!(115));

    let candles: Vec<Candle> = closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            Candle::new(
                start() + Duration::minutes(i as i64),
                *close,
                *close + dec!(1),
                *close - dec!(1),
                *close,
            )
        })
        .collect();

    let high: Vec<f64> = candles.iter().map(|c| c.high.to_f64().unwrap()).collect();
    let low: Vec<f64> = candles.iter().map(|c| c.low.to_f64().unwrap()).collect();
    let close: Vec<f64> = candles.iter().map(|c| c.close.to_f64().unwrap()).collect();
    let points = indicators::supertrend::supertrend(&high, &low, &close);

    assert!(points[9].bullish);
    assert!(!points[10].bullish, "break below the lower band turns bearish");
    assert!(!points[14].bullish, "bearish trend is carried until a breakout");
    assert!(points[15].bullish, "close above the prior upper band turns bullish");
    assert!(points[15].value < close[15]);
    assert!(points[14].value > close[14]);
}
