use crate::commands::EngineState;
use chrono::NaiveDateTime;
use optrade_core::events::{OrderId, TradeIntent};
use optrade_core::subscription::{BrokerId, StrategyKind};
use optrade_strategy::IndicatorRow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Instrument key resolved at start
    InstrumentResolved { symbol: String, instrument_key: String },

    /// A bucket boundary was crossed and a cycle began
    CycleStarted {
        at: NaiveDateTime,
        symbols: Vec<String>,
    },

    /// Latest indicator row and the decision taken for it
    Decision {
        symbol: String,
        row: IndicatorRow,
        intent: TradeIntent,
    },

    /// Entry order placed on an option contract
    EntryPlaced {
        symbol: String,
        trading_symbol: String,
        quantity: u32,
        entry_price: Decimal,
        target_price: Decimal,
        order_id: OrderId,
    },

    /// Entry qualified but was not placed
    EntrySkipped { symbol: String, reason: String },

    /// Exit order placed for an open leg
    ExitPlaced {
        symbol: String,
        trading_symbol: String,
        quantity: u32,
        price: Decimal,
        order_id: OrderId,
    },

    /// Cycle for one subscription ended without a decision
    CycleSkipped { symbol: String, reason: String },

    /// Subscription removed from scheduling
    Deactivated { symbol: String, reason: String },

    /// Error occurred
    Error { symbol: String, message: String },
}

impl EngineEvent {
    /// Symbol the event concerns, if any.
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::InstrumentResolved { symbol, .. }
            | Self::Decision { symbol, .. }
            | Self::EntryPlaced { symbol, .. }
            | Self::EntrySkipped { symbol, .. }
            | Self::ExitPlaced { symbol, .. }
            | Self::CycleSkipped { symbol, .. }
            | Self::Deactivated { symbol, .. }
            | Self::Error { symbol, .. } => Some(symbol),
            Self::CycleStarted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    pub symbol: String,
    pub company: String,
    pub broker: BrokerId,
    pub strategy: StrategyKind,
    pub interval_minutes: u32,
    pub active: bool,
    pub instrument_key: Option<String>,
    pub last_bucket: Option<NaiveDateTime>,
    pub last_decision: Option<TradeIntent>,
    pub consecutive_failures: u32,
    pub deactivation_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub state: EngineState,
    /// Subscriptions currently scheduled.
    pub subscriptions: Vec<SubscriptionStatus>,
    /// Last few subscriptions taken out of scheduling, oldest first.
    pub recently_deactivated: Vec<SubscriptionStatus>,

    // Recent events (last 10)
    pub recent_events: Vec<EngineEvent>,
}

impl EngineSnapshot {
    /// Symbols still being scheduled.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<&str> {
        self.subscriptions.iter().map(|s| s.symbol.as_str()).collect()
    }

    /// Status of an active subscription.
    #[must_use]
    pub fn status(&self, symbol: &str) -> Option<&SubscriptionStatus> {
        self.subscriptions.iter().find(|s| s.symbol == symbol)
    }

    /// Latest deactivation of a symbol, if it is still remembered.
    #[must_use]
    pub fn deactivated(&self, symbol: &str) -> Option<&SubscriptionStatus> {
        self.recently_deactivated
            .iter()
            .rev()
            .find(|s| s.symbol == symbol)
    }
}
