use crate::events::EngineSnapshot;
use anyhow::Result;
use chrono::NaiveTime;
use optrade_core::config::{EngineConfig, RetryConfig};
use optrade_core::error::EngineError;
use optrade_core::events::OrderId;
use optrade_core::subscription::Subscription;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum SchedulerCommand {
    /// Add a subscription, or reactivate one with the same symbol.
    Activate(Box<Subscription>, oneshot::Sender<Result<()>>),
    /// Stop scheduling a symbol. Takes effect from its next cycle.
    Deactivate(String, oneshot::Sender<Result<()>>),
    Snapshot(oneshot::Sender<EngineSnapshot>),
    /// Exit open legs of one symbol, or of every subscribed symbol.
    ClosePositions(Option<String>, oneshot::Sender<Result<CloseReport>>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EngineState {
    Starting,
    Running,
    /// No subscription is active any more.
    Idle,
    Stopped,
}

/// Leg closed through the control surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClosedPosition {
    pub symbol: String,
    pub trading_symbol: String,
    pub quantity: u32,
    /// Limit price sent; zero for a market order.
    pub price: Decimal,
    pub order_id: OrderId,
}

/// Symbol whose legs could not all be closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloseFailure {
    pub symbol: String,
    pub message: String,
}

impl CloseFailure {
    pub(crate) fn new(symbol: &str, error: &EngineError) -> Self {
        Self {
            symbol: symbol.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result of a close-positions request. Legs the broker accepted are
/// reported even when other legs failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloseReport {
    pub closed: Vec<ClosedPosition>,
    pub failures: Vec<CloseFailure>,
}

/// Engine knobs the scheduler and cycle read.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub session_anchor: NaiveTime,
    pub tick_size: Decimal,
    pub max_entries_per_cycle: usize,
    pub worker_count: usize,
    pub adapter_timeout: Duration,
    pub history_lookback_days: u32,
    pub max_consecutive_failures: u32,
    pub retry: RetryConfig,
}

impl EngineSettings {
    #[must_use]
    pub fn from_config(engine: &EngineConfig, retry: &RetryConfig) -> Self {
        Self {
            session_anchor: engine.session_anchor,
            tick_size: engine.tick_size,
            max_entries_per_cycle: engine.max_entries_per_cycle,
            worker_count: engine.worker_count.max(1),
            adapter_timeout: engine.adapter_timeout(),
            history_lookback_days: engine.history_lookback_days,
            max_consecutive_failures: engine.max_consecutive_failures.max(1),
            retry: retry.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default(), &RetryConfig::default())
    }
}
