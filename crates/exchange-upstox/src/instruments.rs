//! Instrument master loaded from the broker's instruments CSV.
//!
//! Only the rows the engine needs are kept: NSE index and equity
//! underlyings, plus index and stock option contracts.

use crate::error::{Result, UpstoxError};
use chrono::{NaiveDate, NaiveDateTime};
use optrade_core::contract::{nearest_strike, select_expiry, InstrumentKey, OptionContract};
use optrade_core::events::OptionType;
use optrade_core::subscription::{company_name_for, is_index};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
struct InstrumentRow {
    instrument_key: String,
    #[serde(default)]
    tradingsymbol: String,
    #[serde(default)]
    name: String,
    expiry: Option<NaiveDate>,
    strike: Option<Decimal>,
    tick_size: Option<Decimal>,
    lot_size: Option<Decimal>,
    instrument_type: String,
    #[serde(default)]
    option_type: String,
    exchange: String,
}

#[derive(Debug, Clone)]
struct Underlying {
    key: InstrumentKey,
    tradingsymbol: String,
    name: String,
    index: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InstrumentMaster {
    underlyings: Vec<Underlying>,
    options: Vec<OptionContract>,
}

/// Instrument name the broker lists an index under.
#[must_use]
pub fn index_name(symbol: &str) -> Option<&'static str> {
    if is_index(symbol) {
        company_name_for(symbol)
    } else {
        None
    }
}

impl InstrumentMaster {
    /// # Errors
    /// Returns an error if the file cannot be opened or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| UpstoxError::InstrumentMaster(format!("{}: {e}", path.display())))?;
        Self::from_reader(file)
    }

    /// # Errors
    /// Returns an error on a malformed row.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut csv = csv::Reader::from_reader(reader);
        let mut master = Self::default();

        for row in csv.deserialize::<InstrumentRow>() {
            master.insert(row?);
        }

        tracing::info!(
            underlyings = master.underlyings.len(),
            options = master.options.len(),
            "Loaded instrument master"
        );
        Ok(master)
    }

    fn insert(&mut self, row: InstrumentRow) {
        match (row.exchange.as_str(), row.instrument_type.as_str()) {
            ("NSE_INDEX", "INDEX") | ("NSE_EQ", "EQUITY") => self.underlyings.push(Underlying {
                key: InstrumentKey::new(row.instrument_key),
                tradingsymbol: row.tradingsymbol,
                name: row.name,
                index: row.instrument_type == "INDEX",
            }),
            (_, "OPTIDX" | "OPTSTK") => {
                let option_type = match row.option_type.as_str() {
                    "CE" => OptionType::Call,
                    "PE" => OptionType::Put,
                    _ => return,
                };
                let (Some(expiry), Some(strike)) = (row.expiry, row.strike) else {
                    return;
                };
                let lot_size = row
                    .lot_size
                    .and_then(|lots| lots.trunc().to_u32())
                    .unwrap_or(1);
                self.options.push(OptionContract {
                    instrument_key: InstrumentKey::new(row.instrument_key),
                    trading_symbol: row.tradingsymbol,
                    underlying: row.name,
                    option_type,
                    strike,
                    expiry,
                    lot_size,
                    tick_size: row.tick_size.unwrap_or_default(),
                });
            }
            _ => {}
        }
    }

    /// Instrument key of an underlying. Indices are matched by their listed
    /// name, equities by trading symbol or registered company name.
    #[must_use]
    pub fn resolve(&self, symbol: &str) -> Option<InstrumentKey> {
        let found = if let Some(name) = index_name(symbol) {
            self.underlyings.iter().find(|u| u.index && u.name == name)
        } else {
            let company = company_name_for(symbol);
            self.underlyings.iter().find(|u| {
                !u.index && (u.tradingsymbol == symbol || Some(u.name.as_str()) == company)
            })
        };
        found.map(|u| u.key.clone())
    }

    /// Every listed contract of one type on an underlying.
    pub fn chain<'a>(
        &'a self,
        symbol: &'a str,
        option_type: OptionType,
    ) -> impl Iterator<Item = &'a OptionContract> + 'a {
        let listed_as = index_name(symbol);
        self.options.iter().filter(move |c| {
            c.option_type == option_type
                && (c.underlying == symbol || Some(c.underlying.as_str()) == listed_as)
        })
    }

    /// Contract to buy for an entry signal: nearest tradable expiry, then
    /// the strike closest to `spot`.
    #[must_use]
    pub fn select(
        &self,
        symbol: &str,
        spot: Decimal,
        option_type: OptionType,
        now: NaiveDateTime,
    ) -> Option<OptionContract> {
        let expiries: Vec<NaiveDate> = self.chain(symbol, option_type).map(|c| c.expiry).collect();
        let expiry = select_expiry(&expiries, now)?;
        nearest_strike(
            self.chain(symbol, option_type).filter(|c| c.expiry == expiry),
            spot,
        )
        .cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.underlyings.is_empty() && self.options.is_empty()
    }
}
