use crate::contract::InstrumentKey;
use crate::events::OptionType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Open position as reported by a broker. Read-only snapshot, re-fetched
/// every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Exchange trading symbol, e.g. `NIFTY25MAR22500CE`.
    pub trading_symbol: String,
    pub instrument_key: InstrumentKey,
    /// Net quantity; positive is long.
    pub quantity: i64,
    pub average_price: Decimal,
    pub last_price: Decimal,
}

impl Position {
    /// Option leg implied by the trading-symbol suffix.
    #[must_use]
    pub fn option_type(&self) -> Option<OptionType> {
        OptionType::from_trading_symbol(&self.trading_symbol)
    }

    #[must_use]
    pub const fn is_long(&self) -> bool {
        self.quantity > 0
    }

    /// True when this position is an option on `underlying`.
    #[must_use]
    pub fn belongs_to(&self, underlying: &str) -> bool {
        self.trading_symbol.starts_with(underlying)
    }
}

/// The state the decision engine transitions from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionState {
    Flat,
    LongCall,
    LongPut,
}

/// Open long option legs of one underlying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionBook {
    pub calls: Vec<Position>,
    pub puts: Vec<Position>,
    /// Leg type of the first open long option in broker order.
    first_leg: Option<OptionType>,
}

impl PositionBook {
    /// Collapses the book into one state.
    ///
    /// A book holding both calls and puts reports the leg the broker listed
    /// first; the other leg is reconsidered next cycle once the first is gone.
    #[must_use]
    pub const fn state(&self) -> PositionState {
        match self.first_leg {
            None => PositionState::Flat,
            Some(OptionType::Call) => PositionState::LongCall,
            Some(OptionType::Put) => PositionState::LongPut,
        }
    }

    #[must_use]
    pub fn is_mixed(&self) -> bool {
        !self.calls.is_empty() && !self.puts.is_empty()
    }

    /// Legs of the given type.
    #[must_use]
    pub fn legs(&self, option_type: OptionType) -> &[Position] {
        match option_type {
            OptionType::Call => &self.calls,
            OptionType::Put => &self.puts,
        }
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.first_leg.is_none()
    }

    /// All open legs, calls first.
    pub fn all_legs(&self) -> impl Iterator<Item = &Position> {
        self.calls.iter().chain(self.puts.iter())
    }
}

/// Maps the broker's position snapshot to the book for one underlying.
///
/// Only long positions whose trading symbol starts with `underlying` and ends
/// in `CE`/`PE` count; flat, short and non-option rows are ignored.
#[must_use]
pub fn reconcile(underlying: &str, positions: &[Position]) -> PositionBook {
    let mut book = PositionBook::default();

    for position in positions {
        if !position.is_long() || !position.belongs_to(underlying) {
            continue;
        }
        let Some(option_type) = position.option_type() else {
            continue;
        };

        if book.first_leg.is_none() {
            book.first_leg = Some(option_type);
        }
        match option_type {
            OptionType::Call => book.calls.push(position.clone()),
            OptionType::Put => book.puts.push(position.clone()),
        }
    }

    book
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(symbol: &str, quantity: i64) -> Position {
        Position {
            trading_symbol: symbol.to_string(),
            instrument_key: InstrumentKey::new(format!("NSE_FO|{symbol}")),
            quantity,
            average_price: dec!(120),
            last_price: dec!(125),
        }
    }

    #[test]
    fn empty_snapshot_is_flat() {
        let book = reconcile("NIFTY", &[]);
        assert_eq!(book.state(), PositionState::Flat);
        assert!(book.is_flat());
    }

    #[test]
    fn open_call_is_long_call() {
        let book = reconcile("NIFTY", &[position("NIFTY25MAR22500CE", 75)]);
        assert_eq!(book.state(), PositionState::LongCall);
        assert_eq!(book.calls.len(), 1);
        assert!(book.puts.is_empty());
    }

    #[test]
    fn closed_and_foreign_positions_are_ignored() {
        let positions = [
            position("NIFTY25MAR22500PE", 0),
            position("BANKNIFTY25MAR48000CE", 30),
            position("RELIANCE", 10),
            position("NIFTY25MAR22400CE", -75),
        ];
        let book = reconcile("NIFTY", &positions);
        assert_eq!(book.state(), PositionState::Flat);
    }

    #[test]
    fn mixed_book_reports_first_listed_leg() {
        let positions = [
            position("SBIN25MAR800PE", 750),
            position("SBIN25MAR820CE", 750),
        ];
        let book = reconcile("SBIN", &positions);
        assert!(book.is_mixed());
        assert_eq!(book.state(), PositionState::LongPut);
        assert_eq!(book.all_legs().count(), 2);
    }
}
