use super::smoothing::rolling_mean;

pub const ATR_PERIOD: usize = 7;
pub const MULTIPLIER: f64 = 3.0;

/// True range per row; the first row has no previous close and uses
/// `high - low`.
#[must_use]
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..high.len())
        .map(|i| {
            let range = high[i] - low[i];
            if i == 0 {
                return range;
            }
            let prev_close = close[i - 1];
            range
                .max((high[i] - prev_close).abs())
                .max((low[i] - prev_close).abs())
        })
        .collect()
}

/// Supertrend line plus the trend it was read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendPoint {
    pub value: f64,
    pub bullish: bool,
}

/// Supertrend(7, 3) as an explicit fold over the bands.
///
/// The trend starts bullish. From row 1 on it turns bullish when the close
/// breaks above the previous row's upper band and bearish when it breaks
/// below the previous row's lower band; otherwise it is carried. The exposed
/// line is the lower band while bullish and the upper band while bearish.
/// Row 0, and every row before the bands exist, is `NaN`.
#[must_use]
pub fn supertrend(high: &[f64], low: &[f64], close: &[f64]) -> Vec<SupertrendPoint> {
    let atr = rolling_mean(&true_range(high, low, close), ATR_PERIOD);
    let hl2: Vec<f64> = high.iter().zip(low).map(|(h, l)| (h + l) / 2.0).collect();
    let upper: Vec<f64> = hl2.iter().zip(&atr).map(|(m, a)| m + MULTIPLIER * a).collect();
    let lower: Vec<f64> = hl2.iter().zip(&atr).map(|(m, a)| m - MULTIPLIER * a).collect();

    let mut points = Vec::with_capacity(close.len());
    let mut bullish = true;

    for i in 0..close.len() {
        if i == 0 {
            points.push(SupertrendPoint {
                value: f64::NAN,
                bullish,
            });
            continue;
        }

        // NaN bands compare false and leave the trend unchanged.
        if close[i] > upper[i - 1] {
            bullish = true;
        } else if close[i] < lower[i - 1] {
            bullish = false;
        }

        let value = if bullish { lower[i] } else { upper[i] };
        points.push(SupertrendPoint { value, bullish });
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_row_true_range_is_high_minus_low() {
        let tr = true_range(&[10.0, 12.0], &[8.0, 11.0], &[9.0, 11.5]);
        assert_eq!(tr[0], 2.0);
        // max(1, |12-9|, |11-9|) = 3
        assert_eq!(tr[1], 3.0);
    }

    #[test]
    fn undefined_until_atr_window_fills() {
        let n = 10;
        let high = vec![101.0; n];
        let low = vec![99.0; n];
        let close = vec![100.0; n];
        let st = supertrend(&high, &low, &close);
        assert!(st[..ATR_PERIOD - 1].iter().all(|p| p.value.is_nan()));
        // Bullish from the start, so the line is the lower band: 100 - 3*2.
        assert!((st[ATR_PERIOD - 1].value - 94.0).abs() < 1e-9);
    }

    #[test]
    fn flips_bearish_on_the_row_that_breaks_the_lower_band() {
        let mut high = vec![101.0; 10];
        let mut low = vec![99.0; 10];
        let mut close = vec![100.0; 10];
        // Lower band at row 8 is 94; a close of 90 on row 9 breaks it.
        high[9] = 91.0;
        low[9] = 89.0;
        close[9] = 90.0;

        let st = supertrend(&high, &low, &close);
        assert!(st[8].bullish);
        assert!(!st[9].bullish);
    }
}
