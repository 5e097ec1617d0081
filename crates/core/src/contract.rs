//! Option contract descriptors and the broker-independent parts of
//! contract selection (expiry skip rule, nearest strike, tick rounding).

use crate::events::OptionType;
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broker-specific tradeable identifier (`NSE_EQ|INE002A01018`, a Kite
/// instrument token, an Angel symbol token, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentKey(pub String);

impl InstrumentKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tradeable option contract as returned by an adapter's chain lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionContract {
    pub instrument_key: InstrumentKey,
    pub trading_symbol: String,
    pub underlying: String,
    pub option_type: OptionType,
    pub strike: Decimal,
    pub expiry: NaiveDate,
    pub lot_size: u32,
    pub tick_size: Decimal,
}

impl OptionContract {
    /// Total quantity for a number of lots.
    #[must_use]
    pub const fn quantity_for_lots(&self, lots: u32) -> u32 {
        lots.saturating_mul(self.lot_size)
    }
}

/// Local hour from which an expiry falling tomorrow is no longer traded.
pub const NEXT_DAY_EXPIRY_CUTOFF_HOUR: u32 = 15;

/// Picks the expiry to trade from the available ones.
///
/// Takes the nearest expiry on or after today, except that an expiry falling
/// today is always skipped and one falling tomorrow is skipped from 15:00
/// onward, provided a later expiry exists.
#[must_use]
pub fn select_expiry(expiries: &[NaiveDate], now: NaiveDateTime) -> Option<NaiveDate> {
    let today = now.date();
    let mut upcoming: Vec<NaiveDate> = expiries.iter().copied().filter(|e| *e >= today).collect();
    upcoming.sort_unstable();
    upcoming.dedup();

    let nearest = *upcoming.first()?;
    let skip = nearest == today
        || (nearest == today + Duration::days(1) && now.hour() >= NEXT_DAY_EXPIRY_CUTOFF_HOUR);

    if skip {
        Some(upcoming.get(1).copied().unwrap_or(nearest))
    } else {
        Some(nearest)
    }
}

/// Contract whose strike is closest to `spot`. Ties keep the first candidate.
#[must_use]
pub fn nearest_strike<'a>(
    contracts: impl IntoIterator<Item = &'a OptionContract>,
    spot: Decimal,
) -> Option<&'a OptionContract> {
    contracts
        .into_iter()
        .fold(None, |best: Option<&OptionContract>, candidate| match best {
            Some(current) if (current.strike - spot).abs() <= (candidate.strike - spot).abs() => {
                Some(current)
            }
            _ => Some(candidate),
        })
}

/// Rounds a price to the nearest multiple of `tick`, then to two decimals.
///
/// Both steps round half to even. A non-positive tick only applies the
/// two-decimal rounding.
#[must_use]
pub fn round_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    let snapped = if tick > Decimal::ZERO {
        (price / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) * tick
    } else {
        price
    };
    snapped.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// `close · (1 + pct/100)` snapped to the tick grid.
#[must_use]
pub fn target_price(close: Decimal, target_pct: Decimal, tick: Decimal) -> Decimal {
    let raw = close * (Decimal::ONE_HUNDRED + target_pct) / Decimal::ONE_HUNDRED;
    round_to_tick(raw, tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn contract(strike: Decimal) -> OptionContract {
        OptionContract {
            instrument_key: InstrumentKey::new(format!("NSE_FO|{strike}")),
            trading_symbol: format!("NIFTY{strike}CE"),
            underlying: "NIFTY".to_string(),
            option_type: OptionType::Call,
            strike,
            expiry: day(13),
            lot_size: 75,
            tick_size: dec!(0.05),
        }
    }

    #[test]
    fn expiry_today_is_skipped() {
        let now = day(13).and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(select_expiry(&[day(20), day(13), day(27)], now), Some(day(20)));
    }

    #[test]
    fn expiry_tomorrow_skipped_only_after_cutoff() {
        let expiries = [day(13), day(20)];
        let morning = day(12).and_hms_opt(14, 59, 0).unwrap();
        let afternoon = day(12).and_hms_opt(15, 0, 0).unwrap();
        assert_eq!(select_expiry(&expiries, morning), Some(day(13)));
        assert_eq!(select_expiry(&expiries, afternoon), Some(day(20)));
    }

    #[test]
    fn lone_expiry_today_is_still_used() {
        let now = day(13).and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(select_expiry(&[day(13)], now), Some(day(13)));
        assert_eq!(select_expiry(&[day(6)], now), None);
    }

    #[test]
    fn nearest_strike_picks_closest() {
        let chain = [contract(dec!(22400)), contract(dec!(22450)), contract(dec!(22500))];
        let picked = nearest_strike(&chain, dec!(22462.3)).unwrap();
        assert_eq!(picked.strike, dec!(22450));
    }

    #[test]
    fn target_price_rounds_to_tick() {
        // 123.45 * 1.1 = 135.795 -> nearest 0.05 is 135.80
        assert_eq!(target_price(dec!(123.45), dec!(10), dec!(0.05)), dec!(135.80));
        // 100 * 1.05 = 105 exactly
        assert_eq!(target_price(dec!(100), dec!(5), dec!(0.05)), dec!(105.00));
    }

    #[test]
    fn round_to_tick_without_tick_keeps_two_decimals() {
        assert_eq!(round_to_tick(dec!(10.126), Decimal::ZERO), dec!(10.13));
    }
}
