use super::smoothing::{ema, rolling_max, rolling_min};

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const WILLR_PERIOD: usize = 14;

#[derive(Debug, Clone, Default)]
pub struct MacdColumns {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
}

/// MACD(12, 26, 9). The EMAs seed from the first close, so every row is
/// defined.
#[must_use]
pub fn macd(close: &[f64]) -> MacdColumns {
    let fast = ema(close, MACD_FAST);
    let slow = ema(close, MACD_SLOW);
    let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = ema(&macd, MACD_SIGNAL);
    let hist = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();
    MacdColumns { macd, signal, hist }
}

/// Williams %R(14), in `[-100, 0]`. Missing for the first 13 rows and
/// wherever the 14-bar range is zero.
#[must_use]
pub fn williams_r(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let highest = rolling_max(high, WILLR_PERIOD);
    let lowest = rolling_min(low, WILLR_PERIOD);
    (0..close.len())
        .map(|i| (highest[i] - close[i]) / (highest[i] - lowest[i]) * -100.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_of_constant_series_is_zero() {
        let columns = macd(&[50.0; 30]);
        assert!(columns.macd.iter().all(|v| *v == 0.0));
        assert!(columns.hist.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn williams_r_bounds() {
        let high: Vec<f64> = (0..14).map(|i| 101.0 + i as f64).collect();
        let low: Vec<f64> = (0..14).map(|i| 99.0 + i as f64).collect();

        let mut close: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        close[13] = high[13];
        let at_high = williams_r(&high, &low, &close);
        assert!(at_high[12].is_nan());
        assert_eq!(at_high[13], 0.0);

        close[13] = low[0];
        let at_low = williams_r(&high, &low, &close);
        assert_eq!(at_low[13], -100.0);
    }
}
