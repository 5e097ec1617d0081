use crate::client::UpstoxClient;
use crate::error::UpstoxError;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use optrade_core::candle::{Candle, CandleWindow};
use optrade_core::contract::{InstrumentKey, OptionContract};
use optrade_core::error::BrokerResult;
use optrade_core::events::{EntryOrder, ExitOrder, OptionType, OrderId};
use optrade_core::position::Position;
use optrade_core::traits::BrokerAdapter;
use rust_decimal::Decimal;

#[async_trait]
impl BrokerAdapter for UpstoxClient {
    fn name(&self) -> &str {
        "upstox"
    }

    async fn resolve_instrument(&self, symbol: &str) -> BrokerResult<InstrumentKey> {
        let key = self.instruments.resolve(symbol).ok_or_else(|| {
            UpstoxError::InstrumentNotFound(format!("{symbol} is not in the instrument master"))
        })?;
        Ok(key)
    }

    async fn fetch_candles(
        &self,
        key: &InstrumentKey,
        interval_minutes: u32,
        window: CandleWindow,
    ) -> BrokerResult<Vec<Candle>> {
        let candles = match window {
            CandleWindow::Historical { lookback_days } => {
                self.historical_candles(key, interval_minutes, lookback_days)
                    .await?
            }
            CandleWindow::Intraday => self.intraday_candles(key, interval_minutes).await?,
        };
        Ok(candles)
    }

    async fn fetch_positions(&self) -> BrokerResult<Vec<Position>> {
        Ok(self.positions().await?)
    }

    async fn place_entry_order(&self, order: &EntryOrder) -> BrokerResult<OrderId> {
        Ok(self.place_gtt_entry(order).await?)
    }

    async fn place_exit_order(&self, order: &ExitOrder) -> BrokerResult<OrderId> {
        Ok(self.place_order(order).await?)
    }

    async fn select_option_contract(
        &self,
        underlying: &str,
        spot: Decimal,
        option_type: OptionType,
        now: NaiveDateTime,
    ) -> BrokerResult<OptionContract> {
        let contract = self
            .instruments
            .select(underlying, spot, option_type, now)
            .ok_or_else(|| {
                UpstoxError::InstrumentNotFound(format!("no {option_type} contract listed for {underlying}"))
            })?;
        Ok(contract)
    }

    async fn last_price(&self, key: &InstrumentKey) -> BrokerResult<Decimal> {
        Ok(UpstoxClient::last_price(self, key).await?)
    }
}
