use crate::contract::InstrumentKey;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Option contract type, named by its trading-symbol suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl OptionType {
    /// Suffix used in exchange trading symbols (`NIFTY25MAR22500CE`).
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Call => "CE",
            Self::Put => "PE",
        }
    }

    /// Parses the two-character suffix of a trading symbol.
    #[must_use]
    pub fn from_trading_symbol(trading_symbol: &str) -> Option<Self> {
        if trading_symbol.ends_with("CE") {
            Some(Self::Call)
        } else if trading_symbol.ends_with("PE") {
            Some(Self::Put)
        } else {
            None
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// What the decision engine wants done for one symbol this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    EnterCall,
    EnterPut,
    ExitCall,
    ExitPut,
    Hold,
}

impl TradeAction {
    #[must_use]
    pub const fn is_entry(self) -> bool {
        matches!(self, Self::EnterCall | Self::EnterPut)
    }

    #[must_use]
    pub const fn is_exit(self) -> bool {
        matches!(self, Self::ExitCall | Self::ExitPut)
    }

    /// The option leg an entry buys or an exit sells.
    #[must_use]
    pub const fn option_type(self) -> Option<OptionType> {
        match self {
            Self::EnterCall | Self::ExitCall => Some(OptionType::Call),
            Self::EnterPut | Self::ExitPut => Some(OptionType::Put),
            Self::Hold => None,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::EnterCall => "ENTER_CALL",
            Self::EnterPut => "ENTER_PUT",
            Self::ExitCall => "EXIT_CALL",
            Self::ExitPut => "EXIT_PUT",
            Self::Hold => "HOLD",
        };
        f.write_str(label)
    }
}

/// Decision for one symbol, consumed immediately by order dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub action: TradeAction,
    /// Close of the row the decision was computed from.
    pub reference_price: Decimal,
    /// Take-profit level; only set for entries.
    pub target_price: Option<Decimal>,
    pub timestamp: NaiveDateTime,
}

impl TradeIntent {
    #[must_use]
    pub fn hold(symbol: impl Into<String>, reference_price: Decimal, timestamp: NaiveDateTime) -> Self {
        Self {
            symbol: symbol.into(),
            action: TradeAction::Hold,
            reference_price,
            target_price: None,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("BUY"),
            Self::Sell => f.write_str("SELL"),
        }
    }
}

/// Conditional (good-till-triggered) entry with a take-profit leg.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryOrder {
    pub instrument_key: InstrumentKey,
    pub trading_symbol: String,
    pub quantity: u32,
    pub side: OrderSide,
    pub reference_price: Decimal,
    pub target_price: Decimal,
}

/// Closing order for an open leg. A zero price means market.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExitOrder {
    pub instrument_key: InstrumentKey,
    pub trading_symbol: String,
    pub quantity: u32,
    pub side: OrderSide,
    pub price: Decimal,
}

/// Broker-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
