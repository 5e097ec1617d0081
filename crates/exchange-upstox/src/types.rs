//! Upstox REST request and response bodies.

use chrono::{DateTime, NaiveDateTime};
use optrade_core::candle::Candle;
use optrade_core::contract::InstrumentKey;
use optrade_core::position::Position;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Every Upstox response wraps its payload the same way.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Envelope<T> {
    pub status: String,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CandleData {
    #[serde(default)]
    pub candles: Vec<RawCandle>,
}

/// `[timestamp, open, high, low, close, volume, open_interest]`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawCandle(
    pub String,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
);

impl RawCandle {
    /// Exchange-local timestamp with the offset dropped.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|ts| ts.naive_local())
    }

    pub fn into_candle(self) -> Option<Candle> {
        let timestamp = self.timestamp()?;
        Some(Candle::new(timestamp, self.1, self.2, self.3, self.4))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawPosition {
    pub tradingsymbol: String,
    pub instrument_token: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub average_price: Option<Decimal>,
    #[serde(default)]
    pub last_price: Option<Decimal>,
}

impl From<RawPosition> for Position {
    fn from(raw: RawPosition) -> Self {
        Self {
            trading_symbol: raw.tradingsymbol,
            instrument_key: InstrumentKey::new(raw.instrument_token),
            quantity: raw.quantity,
            average_price: raw.average_price.unwrap_or_default(),
            last_price: raw.last_price.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawOhlc {
    pub close: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawQuote {
    pub last_price: Option<Decimal>,
    pub live_ohlc: Option<RawOhlc>,
}

impl RawQuote {
    /// Close of the live bar, else the quote's last price.
    pub fn price(&self) -> Option<Decimal> {
        self.live_ohlc
            .as_ref()
            .and_then(|ohlc| ohlc.close)
            .or(self.last_price)
    }
}

/// Quotes keyed by `EXCHANGE:SYMBOL`.
pub(crate) type QuoteData = HashMap<String, RawQuote>;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PlaceOrderRequest<'a> {
    pub quantity: u32,
    pub product: &'static str,
    pub validity: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub tag: &'static str,
    pub instrument_token: &'a str,
    pub order_type: &'static str,
    pub transaction_type: &'static str,
    pub disclosed_quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub trigger_price: Decimal,
    pub is_amo: bool,
    pub slice: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PlaceOrderData {
    #[serde(default)]
    pub order_ids: Vec<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct GttRule {
    pub strategy: &'static str,
    pub trigger_type: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    pub trigger_price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct GttOrderRequest<'a> {
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub quantity: u32,
    pub product: &'static str,
    pub instrument_token: &'a str,
    pub transaction_type: &'static str,
    pub rules: Vec<GttRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GttOrderData {
    #[serde(default)]
    pub gtt_order_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_candle_array_parsing() {
        let json = r#"["2025-03-10T09:15:00+05:30", 22450.5, 22480, 22440.25, 22475, 125000, 0]"#;
        let raw: RawCandle = serde_json::from_str(json).unwrap();
        let candle = raw.into_candle().unwrap();
        assert_eq!(candle.timestamp.to_string(), "2025-03-10 09:15:00");
        assert_eq!(candle.open, dec!(22450.5));
        assert_eq!(candle.close, dec!(22475));
    }

    #[test]
    fn test_quote_prefers_live_close() {
        let json = r#"{"last_price": 101.5, "live_ohlc": {"open": 99, "close": 102.35}}"#;
        let quote: RawQuote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.price(), Some(dec!(102.35)));

        let json = r#"{"last_price": 101.5}"#;
        let quote: RawQuote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.price(), Some(dec!(101.5)));
    }

    #[test]
    fn test_gtt_request_shape() {
        let request = GttOrderRequest {
            order_type: "MULTIPLE",
            quantity: 75,
            product: "D",
            instrument_token: "NSE_FO|1002",
            transaction_type: "BUY",
            rules: vec![GttRule {
                strategy: "ENTRY",
                trigger_type: "BELOW",
                trigger_price: dec!(120.5),
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "MULTIPLE");
        assert_eq!(json["rules"][0]["strategy"], "ENTRY");
        assert_eq!(json["rules"][0]["trigger_price"], 120.5);
    }
}
