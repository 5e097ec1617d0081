//! Upstox REST API client with rate limiting.
//!
//! Provides typed access to the candle, portfolio, quote and order
//! endpoints with automatic rate limiting using the governor crate.

use crate::error::{Result, UpstoxError};
use crate::instruments::InstrumentMaster;
use crate::types::{
    CandleData, Envelope, GttOrderData, GttOrderRequest, GttRule, PlaceOrderData,
    PlaceOrderRequest, QuoteData, RawPosition,
};
use chrono::{Duration, NaiveDate, Timelike};
use chrono_tz::Tz;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use optrade_core::candle::Candle;
use optrade_core::clock::{Clock, SystemClock};
use optrade_core::config::UpstoxConfig;
use optrade_core::contract::InstrumentKey;
use optrade_core::events::{EntryOrder, ExitOrder, OrderId, OrderSide};
use optrade_core::position::Position;
use reqwest::{Client, Url};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Upstox production API base URL.
pub const UPSTOX_API_URL: &str = "https://api.upstox.com";

/// Stop-loss trigger attached to every GTT entry.
const GTT_STOPLOSS_TRIGGER: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Configuration for the Upstox client.
#[derive(Debug, Clone)]
pub struct UpstoxClientConfig {
    /// Base URL for the API.
    pub base_url: String,
    /// Requests per second limit.
    pub requests_per_second: NonZeroU32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Exchange timezone, used for the historical date range.
    pub timezone: Tz,
}

impl Default for UpstoxClientConfig {
    fn default() -> Self {
        Self {
            base_url: UPSTOX_API_URL.to_string(),
            requests_per_second: nonzero!(10u32),
            timeout_secs: 10,
            timezone: chrono_tz::Asia::Kolkata,
        }
    }
}

impl UpstoxClientConfig {
    #[must_use]
    pub fn from_config(config: &UpstoxConfig, timezone: Tz, timeout_secs: u64) -> Self {
        Self {
            base_url: config.api_url.clone(),
            requests_per_second: NonZeroU32::new(config.requests_per_second)
                .unwrap_or(nonzero!(10u32)),
            timeout_secs,
            timezone,
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Upstox REST client.
pub struct UpstoxClient {
    config: UpstoxClientConfig,
    http: Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    token: SecretString,
    clock: Arc<dyn Clock>,
    pub(crate) instruments: InstrumentMaster,
}

impl std::fmt::Debug for UpstoxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstoxClient")
            .field("base_url", &self.config.base_url)
            .field("requests_per_second", &self.config.requests_per_second)
            .finish_non_exhaustive()
    }
}

impl UpstoxClient {
    /// Creates a new client with the given configuration and access token.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: UpstoxClientConfig, token: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UpstoxError::Network(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_second(config.requests_per_second);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.timezone));

        Ok(Self {
            config,
            http,
            rate_limiter,
            token,
            clock,
            instruments: InstrumentMaster::default(),
        })
    }

    /// Builds a client from the `brokers.upstox` config section, loading the
    /// instrument master it points at.
    ///
    /// # Errors
    /// Returns error if no access token is configured or the instrument
    /// master cannot be read.
    pub fn from_config(config: &UpstoxConfig, timezone: Tz, timeout_secs: u64) -> Result<Self> {
        let token = config.access_token.clone().ok_or_else(|| {
            UpstoxError::Authentication(
                "no access token, set OPTRADE_BROKERS__UPSTOX__ACCESS_TOKEN".to_string(),
            )
        })?;
        let instruments = InstrumentMaster::from_path(&config.instruments_csv)?;

        Ok(Self::new(
            UpstoxClientConfig::from_config(config, timezone, timeout_secs),
            SecretString::from(token),
        )?
        .with_instruments(instruments))
    }

    #[must_use]
    pub fn with_instruments(mut self, instruments: InstrumentMaster) -> Self {
        self.instruments = instruments;
        self
    }

    /// Replaces the wall clock (useful for testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Base URL plus percent-encoded path segments.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| UpstoxError::Network(format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| UpstoxError::Network("base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Waits for rate limiter and makes an authenticated GET request.
    async fn get<T: DeserializeOwned>(&self, url: Url, query: &[(&str, &str)]) -> Result<T> {
        self.rate_limiter.until_ready().await;
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .query(query)
            .header("Accept", "application/json")
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Waits for rate limiter and makes an authenticated POST request.
    async fn post<T: DeserializeOwned, B: Serialize>(&self, url: Url, body: &B) -> Result<T> {
        self.rate_limiter.until_ready().await;
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(url)
            .header("Accept", "application/json")
            .bearer_auth(self.token.expose_secret())
            .json(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handles API response, converting errors appropriately.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.as_u16() == 429 {
            return Err(UpstoxError::RateLimit);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UpstoxError::api(status.as_u16(), text));
        }

        let envelope = response.json::<Envelope<T>>().await?;
        if envelope.status != "success" {
            return Err(UpstoxError::OrderRejected(format!(
                "status {}",
                envelope.status
            )));
        }
        envelope
            .data
            .ok_or_else(|| UpstoxError::Serialization("response has no data".to_string()))
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date()
    }

    // =========================================================================
    // Market Data Endpoints
    // =========================================================================

    /// Completed candles from previous sessions, `lookback_days` back from
    /// today and ending yesterday.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn historical_candles(
        &self,
        key: &InstrumentKey,
        interval_minutes: u32,
        lookback_days: u32,
    ) -> Result<Vec<Candle>> {
        let today = self.today();
        let to = (today - Duration::days(1)).format("%Y-%m-%d").to_string();
        let from = (today - Duration::days(i64::from(lookback_days)))
            .format("%Y-%m-%d")
            .to_string();
        let interval = interval_minutes.to_string();

        let url = self.url(&[
            "v3",
            "historical-candle",
            key.as_str(),
            "minutes",
            &interval,
            &to,
            &from,
        ])?;
        let data: CandleData = self.get(url, &[]).await?;

        let candles: Vec<Candle> = data
            .candles
            .into_iter()
            .filter_map(|raw| raw.into_candle())
            .collect();
        tracing::debug!(instrument_key = %key, %from, %to, count = candles.len(), "Historical candles");
        Ok(candles)
    }

    /// Today's candles. Only whole-minute timestamps are kept, which drops
    /// the bar still forming.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn intraday_candles(&self, key: &InstrumentKey, interval_minutes: u32) -> Result<Vec<Candle>> {
        let interval = interval_minutes.to_string();
        let url = self.url(&[
            "v3",
            "historical-candle",
            "intraday",
            key.as_str(),
            "minutes",
            &interval,
        ])?;
        let data: CandleData = self.get(url, &[]).await?;

        Ok(data
            .candles
            .into_iter()
            .filter_map(|raw| raw.into_candle())
            .filter(|c| c.timestamp.second() == 0 && c.timestamp.nanosecond() == 0)
            .collect())
    }

    /// Price of the current daily bar, falling back to the last traded price.
    ///
    /// # Errors
    /// Returns error if the API call fails or the quote has no price.
    pub async fn last_price(&self, key: &InstrumentKey) -> Result<Decimal> {
        let url = self.url(&["v3", "market-quote", "ohlc"])?;
        let quotes: QuoteData = self
            .get(url, &[("instrument_key", key.as_str()), ("interval", "1d")])
            .await?;

        quotes
            .values()
            .next()
            .and_then(|quote| quote.price())
            .ok_or_else(|| UpstoxError::Serialization(format!("no price for {key}")))
    }

    // =========================================================================
    // Portfolio Endpoints
    // =========================================================================

    /// Today's positions, open and closed.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn positions(&self) -> Result<Vec<Position>> {
        let url = self.url(&["v2", "portfolio", "short-term-positions"])?;
        let raw: Vec<RawPosition> = self.get(url, &[]).await?;
        Ok(raw.into_iter().map(Position::from).collect())
    }

    // =========================================================================
    // Order Endpoints
    // =========================================================================

    /// Places a single day order: market when `price` is zero, limit otherwise.
    ///
    /// # Errors
    /// Returns error if the order is rejected or the API call fails.
    pub async fn place_order(&self, order: &ExitOrder) -> Result<OrderId> {
        let order_type = if order.price.is_zero() { "MARKET" } else { "LIMIT" };
        let request = PlaceOrderRequest {
            quantity: order.quantity,
            product: "D",
            validity: "DAY",
            price: order.price,
            tag: "optrade",
            instrument_token: order.instrument_key.as_str(),
            order_type,
            transaction_type: side(order.side),
            disclosed_quantity: 0,
            trigger_price: order.price,
            is_amo: false,
            slice: false,
        };

        let url = self.url(&["v3", "order", "place"])?;
        let data: PlaceOrderData = self.post(url, &request).await?;
        let order_id = data
            .order_ids
            .into_iter()
            .next()
            .or(data.order_id)
            .ok_or_else(|| UpstoxError::Serialization("no order id returned".to_string()))?;

        tracing::info!(
            trading_symbol = %order.trading_symbol,
            order_type,
            quantity = order.quantity,
            price = %order.price,
            order_id = %order_id,
            "Order placed"
        );
        Ok(OrderId(order_id))
    }

    /// Places a GTT entry: buy below the reference price with a fixed stop
    /// and, when set, a target leg.
    ///
    /// # Errors
    /// Returns error if the order is rejected or the API call fails.
    pub async fn place_gtt_entry(&self, order: &EntryOrder) -> Result<OrderId> {
        let mut rules = vec![
            GttRule {
                strategy: "ENTRY",
                trigger_type: "BELOW",
                trigger_price: order.reference_price,
            },
            GttRule {
                strategy: "STOPLOSS",
                trigger_type: "IMMEDIATE",
                trigger_price: GTT_STOPLOSS_TRIGGER,
            },
        ];
        if order.target_price > Decimal::ZERO {
            rules.push(GttRule {
                strategy: "TARGET",
                trigger_type: "IMMEDIATE",
                trigger_price: order.target_price,
            });
        }

        let request = GttOrderRequest {
            order_type: "MULTIPLE",
            quantity: order.quantity,
            product: "D",
            instrument_token: order.instrument_key.as_str(),
            transaction_type: side(order.side),
            rules,
        };

        let url = self.url(&["v3", "order", "gtt", "place"])?;
        let data: GttOrderData = self.post(url, &request).await?;
        let order_id = data
            .gtt_order_ids
            .into_iter()
            .next()
            .ok_or_else(|| UpstoxError::Serialization("no GTT order id returned".to_string()))?;

        tracing::info!(
            trading_symbol = %order.trading_symbol,
            quantity = order.quantity,
            entry = %order.reference_price,
            target = %order.target_price,
            order_id = %order_id,
            "GTT entry placed"
        );
        Ok(OrderId(order_id))
    }
}

/// Wire name of an order side.
const fn side(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}
