//! Paper broker: simulated fills against seeded candles.
//!
//! Entries fill immediately at their reference price and exits at their
//! limit price, or at the instrument's last price for a market order.
//! Positions live in memory for the life of the process.

use crate::loader::load_candles;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use optrade_core::candle::{Candle, CandleWindow};
use optrade_core::clock::{Clock, SystemClock};
use optrade_core::config::PaperConfig;
use optrade_core::contract::{round_to_tick, select_expiry, InstrumentKey, OptionContract};
use optrade_core::error::{BrokerError, BrokerResult};
use optrade_core::events::{EntryOrder, ExitOrder, OptionType, OrderId, OrderSide};
use optrade_core::position::Position;
use optrade_core::traits::BrokerAdapter;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const KEY_PREFIX: &str = "PAPER|";

/// Weekday synthetic option series expire on.
pub const EXPIRY_WEEKDAY: Weekday = Weekday::Thu;

/// A simulated fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    pub order_id: OrderId,
    pub trading_symbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub price: Decimal,
    pub filled_at: NaiveDateTime,
}

#[derive(Debug, Default)]
struct PaperState {
    candles: HashMap<InstrumentKey, Vec<Candle>>,
    prices: HashMap<InstrumentKey, Decimal>,
    positions: Vec<Position>,
    fills: Vec<Fill>,
    next_order: u64,
}

impl PaperState {
    fn price_of(&self, key: &InstrumentKey) -> Option<Decimal> {
        self.prices
            .get(key)
            .copied()
            .or_else(|| self.candles.get(key).and_then(|c| c.last()).map(|c| c.close))
    }

    fn next_order_id(&mut self) -> OrderId {
        self.next_order += 1;
        OrderId(format!("PAPER-{}", self.next_order))
    }
}

pub struct PaperBroker {
    lot_size: u32,
    strike_step: Decimal,
    tick_size: Decimal,
    clock: Arc<dyn Clock>,
    state: Mutex<PaperState>,
}

/// Instrument key the paper broker lists an underlying or contract under.
#[must_use]
pub fn paper_key(symbol: &str) -> InstrumentKey {
    InstrumentKey::new(format!("{KEY_PREFIX}{symbol}"))
}

/// Weekly expiry on or after `day`.
#[must_use]
pub fn weekly_expiry(day: NaiveDate) -> NaiveDate {
    let ahead = (7 + EXPIRY_WEEKDAY.num_days_from_monday() - day.weekday().num_days_from_monday()) % 7;
    day + Duration::days(i64::from(ahead))
}

impl PaperBroker {
    #[must_use]
    pub fn new(config: &PaperConfig) -> Self {
        Self {
            lot_size: config.lot_size.max(1),
            strike_step: config.strike_step,
            tick_size: Decimal::new(5, 2),
            clock: Arc::new(SystemClock::new(chrono_tz::Asia::Kolkata)),
            state: Mutex::new(PaperState::default()),
        }
    }

    /// Builds a broker and seeds it from `candles_dir`, one `{SYMBOL}.csv`
    /// per underlying.
    ///
    /// # Errors
    /// Returns an error if the directory or any candle file cannot be read.
    pub fn from_config(config: &PaperConfig) -> Result<Self> {
        let broker = Self::new(config);
        if let Some(dir) = &config.candles_dir {
            broker.seed_dir(dir)?;
        }
        Ok(broker)
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn seed_dir(&self, dir: &Path) -> Result<()> {
        let entries =
            std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(symbol) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let candles = load_candles(&path)?;
            tracing::info!(symbol, candles = candles.len(), "Seeded paper candles");
            self.seed_candles(&symbol.to_ascii_uppercase(), candles);
        }
        Ok(())
    }

    /// Replaces the candle history of an underlying.
    pub fn seed_candles(&self, symbol: &str, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.timestamp);
        self.state.lock().candles.insert(paper_key(symbol), candles);
    }

    pub fn set_last_price(&self, key: &InstrumentKey, price: Decimal) {
        self.state.lock().prices.insert(key.clone(), price);
    }

    /// Adds a position as if it had been filled earlier.
    pub fn open_position(&self, position: Position) {
        let mut state = self.state.lock();
        state
            .prices
            .entry(position.instrument_key.clone())
            .or_insert(position.last_price);
        state.positions.push(position);
    }

    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.state.lock().positions.clone()
    }

    #[must_use]
    pub fn fills(&self) -> Vec<Fill> {
        self.state.lock().fills.clone()
    }

    fn strike_for(&self, spot: Decimal) -> Decimal {
        if self.strike_step > Decimal::ZERO {
            ((spot / self.strike_step).round() * self.strike_step).normalize()
        } else {
            spot.round().normalize()
        }
    }

    /// Premium a freshly listed synthetic contract starts at: one percent
    /// of spot, at least one tick.
    fn opening_premium(&self, spot: Decimal) -> Decimal {
        round_to_tick(spot / Decimal::ONE_HUNDRED, self.tick_size).max(self.tick_size)
    }

    fn record_fill(
        state: &mut PaperState,
        key: &InstrumentKey,
        trading_symbol: &str,
        side: OrderSide,
        quantity: u32,
        price: Decimal,
        now: NaiveDateTime,
    ) -> BrokerResult<OrderId> {
        let signed = match side {
            OrderSide::Buy => i64::from(quantity),
            OrderSide::Sell => -i64::from(quantity),
        };

        match state.positions.iter_mut().find(|p| &p.instrument_key == key) {
            Some(position) => {
                let new_quantity = position.quantity + signed;
                if new_quantity < 0 {
                    return Err(BrokerError::Rejected(format!(
                        "cannot sell {quantity} {trading_symbol}, holding {}",
                        position.quantity
                    )));
                }
                if signed > 0 {
                    let cost = position.average_price * Decimal::from(position.quantity)
                        + price * Decimal::from(signed);
                    position.average_price = cost / Decimal::from(new_quantity);
                }
                position.quantity = new_quantity;
                position.last_price = price;
            }
            None if signed > 0 => state.positions.push(Position {
                trading_symbol: trading_symbol.to_string(),
                instrument_key: key.clone(),
                quantity: signed,
                average_price: price,
                last_price: price,
            }),
            None => {
                return Err(BrokerError::Rejected(format!(
                    "no position in {trading_symbol}"
                )))
            }
        }

        state.prices.insert(key.clone(), price);
        let order_id = state.next_order_id();
        state.fills.push(Fill {
            order_id: order_id.clone(),
            trading_symbol: trading_symbol.to_string(),
            side,
            quantity,
            price,
            filled_at: now,
        });

        tracing::info!(
            order_id = %order_id,
            trading_symbol,
            side = ?side,
            price = %price,
            quantity,
            "Paper fill simulated"
        );
        Ok(order_id)
    }
}

impl std::fmt::Debug for PaperBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperBroker")
            .field("lot_size", &self.lot_size)
            .field("strike_step", &self.strike_step)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    fn name(&self) -> &str {
        "paper"
    }

    async fn resolve_instrument(&self, symbol: &str) -> BrokerResult<InstrumentKey> {
        let key = paper_key(symbol);
        if self.state.lock().candles.contains_key(&key) {
            Ok(key)
        } else {
            Err(BrokerError::NotFound(format!("no paper candles for {symbol}")))
        }
    }

    async fn fetch_candles(
        &self,
        key: &InstrumentKey,
        interval_minutes: u32,
        window: CandleWindow,
    ) -> BrokerResult<Vec<Candle>> {
        let now = self.clock.now();
        let today = now.date();
        let width = Duration::minutes(i64::from(interval_minutes));

        let state = self.state.lock();
        let candles = state
            .candles
            .get(key)
            .ok_or_else(|| BrokerError::NotFound(key.to_string()))?;

        let selected = candles
            .iter()
            .filter(|c| match window {
                CandleWindow::Historical { lookback_days } => {
                    let day = c.timestamp.date();
                    day < today && day >= today - Duration::days(i64::from(lookback_days))
                }
                CandleWindow::Intraday => c.timestamp.date() == today && c.timestamp + width <= now,
            })
            .copied()
            .collect();
        Ok(selected)
    }

    async fn fetch_positions(&self) -> BrokerResult<Vec<Position>> {
        Ok(self.positions())
    }

    async fn place_entry_order(&self, order: &EntryOrder) -> BrokerResult<OrderId> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        Self::record_fill(
            &mut state,
            &order.instrument_key,
            &order.trading_symbol,
            order.side,
            order.quantity,
            order.reference_price,
            now,
        )
    }

    async fn place_exit_order(&self, order: &ExitOrder) -> BrokerResult<OrderId> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let price = if order.price > Decimal::ZERO {
            order.price
        } else {
            state
                .price_of(&order.instrument_key)
                .ok_or_else(|| BrokerError::Rejected(format!("no market for {}", order.trading_symbol)))?
        };
        Self::record_fill(
            &mut state,
            &order.instrument_key,
            &order.trading_symbol,
            order.side,
            order.quantity,
            price,
            now,
        )
    }

    async fn select_option_contract(
        &self,
        underlying: &str,
        spot: Decimal,
        option_type: OptionType,
        now: NaiveDateTime,
    ) -> BrokerResult<OptionContract> {
        let this_week = weekly_expiry(now.date());
        let expiry = select_expiry(&[this_week, this_week + Duration::days(7)], now)
            .unwrap_or(this_week);
        let strike = self.strike_for(spot);
        let trading_symbol = format!("{underlying}{strike}{}", option_type.suffix());
        let instrument_key = paper_key(&trading_symbol);

        self.state
            .lock()
            .prices
            .entry(instrument_key.clone())
            .or_insert_with(|| self.opening_premium(spot));

        Ok(OptionContract {
            instrument_key,
            trading_symbol,
            underlying: underlying.to_string(),
            option_type,
            strike,
            expiry,
            lot_size: self.lot_size,
            tick_size: self.tick_size,
        })
    }

    async fn last_price(&self, key: &InstrumentKey) -> BrokerResult<Decimal> {
        self.state
            .lock()
            .price_of(key)
            .ok_or_else(|| BrokerError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_weekly_expiry_lands_on_thursday() {
        // 2025-03-10 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(weekly_expiry(monday), NaiveDate::from_ymd_opt(2025, 3, 13).unwrap());
        let thursday = NaiveDate::from_ymd_opt(2025, 3, 13).unwrap();
        assert_eq!(weekly_expiry(thursday), thursday);
        let friday = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        assert_eq!(weekly_expiry(friday), NaiveDate::from_ymd_opt(2025, 3, 20).unwrap());
    }

    #[test]
    fn test_strike_rounds_to_step() {
        let broker = PaperBroker::new(&PaperConfig::default());
        assert_eq!(broker.strike_for(dec!(22474)), dec!(22450));
        assert_eq!(broker.strike_for(dec!(22476)), dec!(22500));
    }

    #[test]
    fn test_opening_premium_is_at_least_one_tick() {
        let broker = PaperBroker::new(&PaperConfig::default());
        assert_eq!(broker.opening_premium(dec!(22450)), dec!(224.50));
        assert_eq!(broker.opening_premium(dec!(1)), dec!(0.05));
    }
}
