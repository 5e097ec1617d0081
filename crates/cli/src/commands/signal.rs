//! `optrade signal`: run the indicator pipeline and decision engine over a
//! candle CSV and print what the engine would do on its latest row.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use optrade_core::candle::CandleSeries;
use optrade_core::position::PositionState;
use optrade_core::subscription::StrategyKind;
use optrade_paper::load_candles;
use optrade_strategy::{decide, latest, table, MIN_ROWS};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum HeldLeg {
    Flat,
    Call,
    Put,
}

impl From<HeldLeg> for PositionState {
    fn from(leg: HeldLeg) -> Self {
        match leg {
            HeldLeg::Flat => Self::Flat,
            HeldLeg::Call => Self::LongCall,
            HeldLeg::Put => Self::LongPut,
        }
    }
}

/// Arguments for the signal command.
#[derive(Args, Debug, Clone)]
pub struct SignalArgs {
    /// Candle CSV with a header row: timestamp,open,high,low,close
    #[arg(long)]
    pub csv: PathBuf,

    /// Strategy id (ADX_MACD_WillR_Supertrend or Ema10_Ema20_Supertrend)
    #[arg(short, long)]
    pub strategy: StrategyKind,

    /// Position held before the decision
    #[arg(long, value_enum, default_value = "flat")]
    pub held: HeldLeg,

    /// Symbol shown in the intent (defaults to the file name)
    #[arg(long)]
    pub symbol: Option<String>,

    /// Target percentage applied to entries
    #[arg(long, default_value = "10")]
    pub target_pct: Decimal,

    /// Tick size targets are rounded to
    #[arg(long, default_value = "0.05")]
    pub tick: Decimal,
}

/// Runs the signal command.
///
/// # Errors
/// Returns an error if the CSV cannot be read.
pub fn run_signal(args: &SignalArgs) -> Result<()> {
    let candles = load_candles(&args.csv)?;
    let series = CandleSeries::from_candles(candles);
    let symbol = args
        .symbol
        .clone()
        .or_else(|| {
            args.csv
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_ascii_uppercase)
        })
        .context("Cannot derive a symbol from the file name, pass --symbol")?;

    let Some(row) = latest(&series) else {
        println!(
            "{symbol}: not enough data ({} candles, at least {MIN_ROWS} needed and every indicator defined)",
            series.len()
        );
        return Ok(());
    };

    for line in table::render_row(&row) {
        println!("{line}");
    }

    let intent = decide(
        &symbol,
        args.strategy,
        &row,
        args.held.into(),
        args.target_pct,
        args.tick,
    );
    let target = intent
        .target_price
        .map_or_else(|| "-".to_string(), |t| t.to_string());
    println!(
        "{} {} @ {} target {} ({})",
        intent.symbol, intent.action, intent.reference_price, target, intent.timestamp
    );
    Ok(())
}
