use crate::contract::InstrumentKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strategy a subscription trades with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    #[serde(rename = "ADX_MACD_WillR_Supertrend")]
    AdxMacdWillRSupertrend,
    #[serde(rename = "Ema10_Ema20_Supertrend")]
    Ema10Ema20Supertrend,
}

impl StrategyKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdxMacdWillRSupertrend => "ADX_MACD_WillR_Supertrend",
            Self::Ema10Ema20Supertrend => "Ema10_Ema20_Supertrend",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADX_MACD_WillR_Supertrend" | "adx_macd_willr_supertrend" => {
                Ok(Self::AdxMacdWillRSupertrend)
            }
            "Ema10_Ema20_Supertrend" | "ema10_ema20_supertrend" => Ok(Self::Ema10Ema20Supertrend),
            other => anyhow::bail!("Unknown strategy: {other}"),
        }
    }
}

/// Broker a subscription routes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerId {
    Upstox,
    Zerodha,
    AngelOne,
    FivePaisa,
    Groww,
    Paper,
}

impl BrokerId {
    /// Parses the single-letter keys the control surface sends as well as
    /// full names.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "u" | "upstox" => Some(Self::Upstox),
            "z" | "zerodha" => Some(Self::Zerodha),
            "a" | "angelone" => Some(Self::AngelOne),
            "5" | "5paisa" | "fivepaisa" => Some(Self::FivePaisa),
            "g" | "groww" => Some(Self::Groww),
            "p" | "paper" => Some(Self::Paper),
            _ => None,
        }
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Upstox => "Upstox",
            Self::Zerodha => "Zerodha",
            Self::AngelOne => "AngelOne",
            Self::FivePaisa => "5paisa",
            Self::Groww => "Groww",
            Self::Paper => "Paper",
        };
        f.write_str(name)
    }
}

/// One (symbol, broker, strategy) registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub symbol: String,
    #[serde(default)]
    pub company_name: Option<String>,
    pub broker: BrokerId,
    pub strategy: StrategyKind,
    /// Candle width in minutes.
    pub interval_minutes: u32,
    pub lots: u32,
    pub target_pct: Decimal,
    /// Resolved once when the session starts, then reused.
    #[serde(default, skip_deserializing)]
    pub instrument_key: Option<InstrumentKey>,
    #[serde(default = "default_active", skip_deserializing)]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

impl Subscription {
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        broker: BrokerId,
        strategy: StrategyKind,
        interval_minutes: u32,
        lots: u32,
        target_pct: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            company_name: None,
            broker,
            strategy,
            interval_minutes,
            lots,
            target_pct,
            instrument_key: None,
            active: true,
        }
    }

    /// Company name, falling back to the built-in table and then the symbol.
    #[must_use]
    pub fn company(&self) -> &str {
        self.company_name
            .as_deref()
            .or_else(|| company_name_for(&self.symbol))
            .unwrap_or(&self.symbol)
    }

    /// Rejects registrations the engine cannot trade.
    ///
    /// # Errors
    /// Returns an error naming the offending field.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.symbol.trim().is_empty() {
            anyhow::bail!("Subscription symbol must not be empty");
        }
        if self.interval_minutes == 0 {
            anyhow::bail!("{}: interval must be at least one minute", self.symbol);
        }
        if self.lots == 0 {
            anyhow::bail!("{}: lots must be positive", self.symbol);
        }
        if self.target_pct < Decimal::ZERO {
            anyhow::bail!("{}: target percentage must not be negative", self.symbol);
        }
        Ok(())
    }
}

const COMPANY_NAMES: &[(&str, &str)] = &[
    ("RELIANCE", "RELIANCE INDUSTRIES LTD"),
    ("HDFCBANK", "HDFC BANK LTD"),
    ("ICICIBANK", "ICICI BANK LTD."),
    ("INFY", "INFOSYS LIMITED"),
    ("TCS", "TATA CONSULTANCY SERV LT"),
    ("SBIN", "STATE BANK OF INDIA"),
    ("AXISBANK", "AXIS BANK LTD"),
    ("KOTAKBANK", "KOTAK MAHINDRA BANK LTD"),
    ("ITC", "ITC LTD"),
    ("LT", "LARSEN & TOUBRO LTD."),
    ("BAJFINANCE", "BAJAJ FINANCE LIMITED"),
    ("HINDUNILVR", "HINDUSTAN UNILEVER LTD"),
    ("SUNPHARMA", "SUN PHARMACEUTICAL IND L"),
    ("MARUTI", "MARUTI SUZUKI INDIA LTD"),
    ("NTPC", "NTPC LTD"),
    ("HCLTECH", "HCL TECHNOLOGIES LTD"),
    ("ULTRACEMCO", "ULTRATECH CEMENT LIMITED"),
    ("TATAMOTORS", "TATA MOTORS LIMITED"),
    ("TITAN", "TITAN COMPANY LIMITED"),
    ("BEL", "BHARAT ELECTRONICS LTD"),
    ("POWERGRID", "POWER GRID CORP. LTD"),
    ("TATASTEEL", "TATA STEEL LIMITED"),
    ("TRENT", "TRENT LTD"),
    ("ASIANPAINT", "ASIAN PAINTS LIMITED"),
    ("JIOFIN", "JIO FIN SERVICES LTD"),
    ("BAJAJFINSV", "BAJAJ FINSERV LTD"),
    ("GRASIM", "GRASIM INDUSTRIES LTD"),
    ("ADANIPORTS", "ADANI PORT & SEZ LTD"),
    ("JSWSTEEL", "JSW STEEL LIMITED"),
    ("HINDALCO", "HINDALCO INDUSTRIES LTD"),
    ("ONGC", "OIL AND NATURAL GAS CORP"),
    ("TECHM", "TECH MAHINDRA LIMITED"),
    ("BAJAJ-AUTO", "BAJAJ AUTO LIMITED"),
    ("SHRIRAMFIN", "SHRIRAM FINANCE LIMITED"),
    ("CIPLA", "CIPLA LTD"),
    ("COALINDIA", "COAL INDIA LTD"),
    ("SBILIFE", "SBI LIFE INSURANCE CO LTD"),
    ("HDFCLIFE", "HDFC LIFE INS CO LTD"),
    ("NESTLEIND", "NESTLE INDIA LIMITED"),
    ("DRREDDY", "DR. REDDY S LABORATORIES"),
    ("APOLLOHOSP", "APOLLO HOSPITALS ENTER. L"),
    ("EICHERMOT", "EICHER MOTORS LTD"),
    ("WIPRO", "WIPRO LTD"),
    ("TATACONSUM", "TATA CONSUMER PRODUCT LTD"),
    ("ADANIENT", "ADANI ENTERPRISES LIMITED"),
    ("HEROMOTOCO", "HERO MOTOCORP LIMITED"),
    ("INDUSINDBK", "INDUSIND BANK LIMITED"),
    ("NIFTY", "Nifty 50"),
    ("BANKNIFTY", "Nifty Bank"),
    ("FINNIFTY", "Nifty Fin Service"),
    ("MIDCPNIFTY", "NIFTY MID SELECT"),
];

/// Registered company (or index) name for an NSE symbol.
#[must_use]
pub fn company_name_for(symbol: &str) -> Option<&'static str> {
    COMPANY_NAMES
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, name)| *name)
}

/// True for the index underlyings, which trade index options.
#[must_use]
pub fn is_index(symbol: &str) -> bool {
    matches!(symbol, "NIFTY" | "BANKNIFTY" | "FINNIFTY" | "MIDCPNIFTY")
}
