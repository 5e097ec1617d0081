use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use optrade_core::candle::Candle;
use rust_decimal::Decimal;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parses an exchange-local timestamp. Offsets are dropped, keeping the
/// wall time they were written in.
///
/// # Errors
/// Returns an error if no known format matches.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .with_context(|| format!("unrecognised timestamp: {raw}"))
}

/// Loads candles from a CSV file.
///
/// # Errors
///
/// Returns an error if:
/// - The CSV file cannot be opened
/// - A row has fewer than five columns
/// - Timestamp or price parsing fails
pub fn load_candles(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_candles(file).with_context(|| format!("reading {}", path.display()))
}

/// Reads `timestamp,open,high,low,close[,volume...]` rows with a header line.
/// The result is sorted by timestamp.
///
/// # Errors
/// Returns an error on the first malformed row.
pub fn read_candles(reader: impl Read) -> Result<Vec<Candle>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut candles = Vec::new();

    for (line, result) in reader.records().enumerate() {
        let record = result?;
        if record.len() < 5 {
            anyhow::bail!("row {}: expected at least 5 columns, got {}", line + 1, record.len());
        }
        let price = |i: usize| {
            Decimal::from_str(&record[i]).with_context(|| format!("row {}: bad price {:?}", line + 1, &record[i]))
        };
        candles.push(Candle::new(
            parse_timestamp(&record[0])?,
            price(1)?,
            price(2)?,
            price(3)?,
            price(4)?,
        ));
    }

    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reads_and_sorts_rows() {
        let csv = "\
timestamp,open,high,low,close,volume
2025-03-10 09:20:00,101,103,100,102,500
2025-03-10T09:15:00+05:30,100,101.5,99.5,101,800
";
        let candles = read_candles(csv.as_bytes()).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp.to_string(), "2025-03-10 09:15:00");
        assert_eq!(candles[0].high, dec!(101.5));
        assert_eq!(candles[1].close, dec!(102));
    }

    #[test]
    fn test_short_row_is_rejected() {
        let csv = "timestamp,open,high,low,close\n2025-03-10 09:15:00,100,101\n";
        assert!(read_candles(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("2025-03-10 09:15").is_ok());
    }
}
