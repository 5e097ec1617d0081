use crate::subscription::Subscription;
use chrono::NaiveTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub brokers: BrokersConfig,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

impl AppConfig {
    /// Checks every knob and subscription before the engine starts.
    ///
    /// # Errors
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.engine.validate()?;
        self.retry.validate()?;
        for subscription in &self.subscriptions {
            subscription.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// IANA name of the exchange timezone.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Time of day the interval buckets are counted from.
    #[serde(default = "default_session_anchor")]
    pub session_anchor: NaiveTime,
    /// Price tick used when a contract does not report its own.
    #[serde(default = "default_tick_size")]
    pub tick_size: Decimal,
    #[serde(default = "default_max_entries_per_cycle")]
    pub max_entries_per_cycle: usize,
    /// Concurrent candle fetches per cycle.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_adapter_timeout_secs")]
    pub adapter_timeout_secs: u64,
    #[serde(default = "default_history_lookback_days")]
    pub history_lookback_days: u32,
    /// Failed cycles in a row before a subscription is deactivated.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_timezone() -> String {
    "Asia/Kolkata".to_string()
}

fn default_session_anchor() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN)
}

fn default_tick_size() -> Decimal {
    Decimal::new(5, 2)
}

const fn default_max_entries_per_cycle() -> usize {
    1
}

const fn default_worker_count() -> usize {
    4
}

const fn default_adapter_timeout_secs() -> u64 {
    10
}

const fn default_history_lookback_days() -> u32 {
    25
}

const fn default_max_consecutive_failures() -> u32 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            session_anchor: default_session_anchor(),
            tick_size: default_tick_size(),
            max_entries_per_cycle: default_max_entries_per_cycle(),
            worker_count: default_worker_count(),
            adapter_timeout_secs: default_adapter_timeout_secs(),
            history_lookback_days: default_history_lookback_days(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl EngineConfig {
    /// Parsed exchange timezone.
    ///
    /// # Errors
    /// Returns an error if the name is not a known IANA zone.
    pub fn tz(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {e}", self.timezone))
    }

    #[must_use]
    pub const fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    /// # Errors
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.tz()?;
        if self.tick_size <= Decimal::ZERO {
            anyhow::bail!("engine.tick_size must be positive");
        }
        if self.worker_count == 0 {
            anyhow::bail!("engine.worker_count must be at least 1");
        }
        if self.adapter_timeout_secs == 0 {
            anyhow::bail!("engine.adapter_timeout_secs must be at least 1");
        }
        if self.max_consecutive_failures == 0 {
            anyhow::bail!("engine.max_consecutive_failures must be at least 1");
        }
        Ok(())
    }
}

/// Bounded exponential backoff for broker calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    250
}

const fn default_max_backoff_ms() -> u64 {
    4_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based), doubling up to the cap.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1_u64 << retry.saturating_sub(1).min(20);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }

    /// # Errors
    /// Returns an error if no attempt would ever be made.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            anyhow::bail!("retry.initial_backoff_ms must not exceed retry.max_backoff_ms");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokersConfig {
    #[serde(default)]
    pub upstox: Option<UpstoxConfig>,
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstoxConfig {
    #[serde(default = "default_upstox_api_url")]
    pub api_url: String,
    /// Read from `OPTRADE_BROKERS__UPSTOX__ACCESS_TOKEN`; never commit it.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Path to the broker's instrument master CSV.
    pub instruments_csv: PathBuf,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

fn default_upstox_api_url() -> String {
    "https://api.upstox.com".to_string()
}

const fn default_requests_per_second() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Directory of `{SYMBOL}.csv` candle files to seed the paper broker with.
    #[serde(default)]
    pub candles_dir: Option<PathBuf>,
    #[serde(default = "default_paper_lot_size")]
    pub lot_size: u32,
    #[serde(default = "default_paper_strike_step")]
    pub strike_step: Decimal,
}

const fn default_paper_lot_size() -> u32 {
    75
}

fn default_paper_strike_step() -> Decimal {
    Decimal::new(50, 0)
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            candles_dir: None,
            lot_size: default_paper_lot_size(),
            strike_step: default_paper_strike_step(),
        }
    }
}
