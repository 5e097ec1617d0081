//! Indicator pipeline: candle series in, fully-defined indicator rows out.
//!
//! Pure and deterministic. Arithmetic runs in `f64` with `NaN` marking
//! undefined values; every surviving value is converted to `Decimal` and
//! rounded to two places, half to even, at the boundary.
//!
//! Indicators:
//! - Supertrend(7, 3) as an explicit fold over ATR bands
//! - MACD(12, 26, 9)
//! - ADX(14) with Wilder smoothing, plus EMA(21) of ADX
//! - Williams %R(14)
//! - EMA(10) and EMA(20) of close

pub mod adx;
pub mod oscillators;
pub mod smoothing;
pub mod supertrend;

use chrono::NaiveDateTime;
use optrade_core::candle::{Candle, CandleSeries};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// Fewer input rows than this can never yield a fully-defined row.
pub const MIN_ROWS: usize = oscillators::WILLR_PERIOD;

pub const EMA_FAST: usize = 10;
pub const EMA_SLOW: usize = 20;

/// One candle with every indicator defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub timestamp: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub supertrend: Decimal,
    pub macd: Decimal,
    pub macd_signal: Decimal,
    pub macd_hist: Decimal,
    pub adx: Decimal,
    pub adx_ema21: Decimal,
    pub willr14: Decimal,
    pub ema_fast: Decimal,
    pub ema_slow: Decimal,
}

impl IndicatorRow {
    /// Column names and formatted values, in display order.
    #[must_use]
    pub fn columns(&self) -> [(&'static str, String); 14] {
        [
            ("timestamp", self.timestamp.format("%Y-%m-%d %H:%M").to_string()),
            ("open", self.open.to_string()),
            ("high", self.high.to_string()),
            ("low", self.low.to_string()),
            ("close", self.close.to_string()),
            ("Supertrend", self.supertrend.to_string()),
            ("MACD", self.macd.to_string()),
            ("MACD_signal", self.macd_signal.to_string()),
            ("MACD_hist", self.macd_hist.to_string()),
            ("ADX", self.adx.to_string()),
            ("ADX_EMA21", self.adx_ema21.to_string()),
            ("WillR_14", self.willr14.to_string()),
            ("ema10", self.ema_fast.to_string()),
            ("ema20", self.ema_slow.to_string()),
        ]
    }
}

fn column(candles: &[Candle], field: impl Fn(&Candle) -> Decimal) -> Vec<f64> {
    candles
        .iter()
        .map(|c| field(c).to_f64().unwrap_or(f64::NAN))
        .collect()
}

/// Two-place half-to-even decimal, or `None` for a missing or infinite value.
///
/// Rounding reads the exact binary value, so `2.675` (stored just below the
/// midpoint) becomes `2.67`.
fn to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    let rounded = round2(Decimal::from_f64_retain(value)?);
    // Normalise negative zero.
    Some(if rounded.is_zero() { Decimal::ZERO } else { rounded })
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Computes every indicator for `series` and keeps only fully-defined rows.
///
/// Fewer than [`MIN_ROWS`] candles yields an empty result, as does a series
/// whose indicators never become defined together. Neither is an error.
#[must_use]
pub fn compute(series: &CandleSeries) -> Vec<IndicatorRow> {
    let candles = series.candles();
    if candles.len() < MIN_ROWS {
        return Vec::new();
    }

    let high = column(candles, |c| c.high);
    let low = column(candles, |c| c.low);
    let close = column(candles, |c| c.close);

    let st = supertrend::supertrend(&high, &low, &close);
    let macd = oscillators::macd(&close);
    let adx = adx::adx(&high, &low, &close);
    let willr = oscillators::williams_r(&high, &low, &close);
    let ema_fast = smoothing::ema(&close, EMA_FAST);
    let ema_slow = smoothing::ema(&close, EMA_SLOW);

    candles
        .iter()
        .enumerate()
        .filter_map(|(i, candle)| {
            Some(IndicatorRow {
                timestamp: candle.timestamp,
                open: round2(candle.open),
                high: round2(candle.high),
                low: round2(candle.low),
                close: round2(candle.close),
                supertrend: to_decimal(st[i].value)?,
                macd: to_decimal(macd.macd[i])?,
                macd_signal: to_decimal(macd.signal[i])?,
                macd_hist: to_decimal(macd.hist[i])?,
                adx: to_decimal(adx.adx[i])?,
                adx_ema21: to_decimal(adx.adx_ema21[i])?,
                willr14: to_decimal(willr[i])?,
                ema_fast: to_decimal(ema_fast[i])?,
                ema_slow: to_decimal(ema_slow[i])?,
            })
        })
        .collect()
}

/// Latest fully-defined row, if any.
#[must_use]
pub fn latest(series: &CandleSeries) -> Option<IndicatorRow> {
    compute(series).pop()
}
