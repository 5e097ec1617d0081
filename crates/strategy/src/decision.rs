//! Position-aware decision engine.
//!
//! Entries only happen from [`PositionState::Flat`] and exits only from a
//! long leg of the matching type. Every comparison is strict, so a row that
//! sits exactly on a threshold never triggers a transition.

use crate::indicators::IndicatorRow;
use optrade_core::contract::target_price;
use optrade_core::events::{TradeAction, TradeIntent};
use optrade_core::position::PositionState;
use optrade_core::subscription::StrategyKind;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const WILLR_OVERBOUGHT: Decimal = dec!(-30);
const WILLR_OVERSOLD: Decimal = dec!(-70);

/// Transition conditions a strategy reads off one row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub enter_call: bool,
    pub enter_put: bool,
    pub exit_call: bool,
    pub exit_put: bool,
}

/// Evaluates a strategy's conditions for one row.
#[must_use]
pub fn signals(strategy: StrategyKind, row: &IndicatorRow) -> Signals {
    match strategy {
        StrategyKind::AdxMacdWillRSupertrend => adx_macd_willr_supertrend(row),
        StrategyKind::Ema10Ema20Supertrend => ema_supertrend(row),
    }
}

fn adx_macd_willr_supertrend(row: &IndicatorRow) -> Signals {
    let trending = row.adx > row.adx_ema21;
    let overbought = row.willr14 > WILLR_OVERBOUGHT;
    let oversold = row.willr14 < WILLR_OVERSOLD;
    let st_below = row.supertrend < row.close;
    let st_above = row.supertrend > row.close;
    let macd_up = row.macd > row.macd_signal;
    let macd_down = row.macd < row.macd_signal;

    Signals {
        enter_call: trending && overbought && st_below && macd_up,
        enter_put: trending && oversold && st_above && macd_down,
        exit_call: (oversold && st_above) || (oversold && macd_down) || (st_above && macd_down),
        exit_put: (overbought && st_below) || (overbought && macd_up) || (st_below && macd_up),
    }
}

fn ema_supertrend(row: &IndicatorRow) -> Signals {
    let fast_above = row.ema_fast > row.ema_slow;
    let fast_below = row.ema_fast < row.ema_slow;
    let st_below = row.supertrend < row.close;
    let st_above = row.supertrend > row.close;

    Signals {
        enter_call: fast_above && st_below,
        enter_put: fast_below && st_above,
        exit_call: fast_below || st_above,
        exit_put: fast_above || st_below,
    }
}

/// Action for a row given the current position state. Total: anything not
/// matched is [`TradeAction::Hold`].
#[must_use]
pub fn decide_action(strategy: StrategyKind, row: &IndicatorRow, state: PositionState) -> TradeAction {
    let signals = signals(strategy, row);
    match state {
        PositionState::LongCall if signals.exit_call => TradeAction::ExitCall,
        PositionState::LongPut if signals.exit_put => TradeAction::ExitPut,
        PositionState::Flat if signals.enter_call => TradeAction::EnterCall,
        PositionState::Flat if signals.enter_put => TradeAction::EnterPut,
        _ => TradeAction::Hold,
    }
}

/// Full trade intent for a symbol. Entries carry a target of
/// `close · (1 + target_pct/100)` snapped to `tick`.
#[must_use]
pub fn decide(
    symbol: &str,
    strategy: StrategyKind,
    row: &IndicatorRow,
    state: PositionState,
    target_pct: Decimal,
    tick: Decimal,
) -> TradeIntent {
    let action = decide_action(strategy, row, state);
    let target = action
        .is_entry()
        .then(|| target_price(row.close, target_pct, tick));

    TradeIntent {
        symbol: symbol.to_string(),
        action,
        reference_price: row.close,
        target_price: target,
        timestamp: row.timestamp,
    }
}
