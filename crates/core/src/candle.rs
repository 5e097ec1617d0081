use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One OHLC bar for a fixed time bucket.
///
/// Timestamps are exchange-local wall clock time, the same frame the
/// [`IntervalClock`](crate::clock::IntervalClock) works in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Candle {
    #[must_use]
    pub const fn new(
        timestamp: NaiveDateTime,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }
}

/// Which slice of history a candle fetch asks the broker for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleWindow {
    /// Completed sessions before today, going back `lookback_days`.
    Historical { lookback_days: u32 },
    /// Today's completed candles.
    Intraday,
}

/// Ordered, deduplicated candle sequence.
///
/// Built once per cycle and never mutated afterwards: the only constructors
/// sort and deduplicate, so timestamps are always strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Builds a series from candles in any order.
    ///
    /// When two candles share a timestamp the one appearing later in the
    /// input wins.
    #[must_use]
    pub fn from_candles(candles: impl IntoIterator<Item = Candle>) -> Self {
        let by_time: BTreeMap<NaiveDateTime, Candle> = candles
            .into_iter()
            .map(|candle| (candle.timestamp, candle))
            .collect();

        Self {
            candles: by_time.into_values().collect(),
        }
    }

    /// Merges a historical window with a fresher intraday window.
    ///
    /// The result is sorted ascending by timestamp; on overlap the intraday
    /// candle replaces the historical one. Either side may be empty.
    #[must_use]
    pub fn merge(historical: Vec<Candle>, intraday: Vec<Candle>) -> Self {
        Self::from_candles(historical.into_iter().chain(intraday))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    #[must_use]
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    #[must_use]
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }
}
