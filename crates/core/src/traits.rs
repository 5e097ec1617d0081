use crate::candle::{Candle, CandleWindow};
use crate::contract::{InstrumentKey, OptionContract};
use crate::error::BrokerResult;
use crate::events::{EntryOrder, ExitOrder, OptionType, OrderId};
use crate::position::Position;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;

/// Narrow interface the scheduler drives a broker through.
///
/// Implementations hold their authenticated session and are shared
/// read-only as `Arc<dyn BrokerAdapter>`.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Broker display name, used in logs.
    fn name(&self) -> &str;

    /// Resolves an underlying symbol to the broker's instrument key.
    async fn resolve_instrument(&self, symbol: &str) -> BrokerResult<InstrumentKey>;

    /// Completed candles of `interval_minutes` width within `window`, in any order.
    async fn fetch_candles(
        &self,
        key: &InstrumentKey,
        interval_minutes: u32,
        window: CandleWindow,
    ) -> BrokerResult<Vec<Candle>>;

    /// Every position on the account, open or closed.
    async fn fetch_positions(&self) -> BrokerResult<Vec<Position>>;

    async fn place_entry_order(&self, order: &EntryOrder) -> BrokerResult<OrderId>;

    async fn place_exit_order(&self, order: &ExitOrder) -> BrokerResult<OrderId>;

    /// Option contract to trade for `underlying` at `spot`.
    async fn select_option_contract(
        &self,
        underlying: &str,
        spot: Decimal,
        option_type: OptionType,
        now: NaiveDateTime,
    ) -> BrokerResult<OptionContract>;

    /// Last traded price of an instrument.
    async fn last_price(&self, key: &InstrumentKey) -> BrokerResult<Decimal>;
}
