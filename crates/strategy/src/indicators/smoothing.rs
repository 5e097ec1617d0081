//! Exponential and rolling smoothers over `f64` columns.
//!
//! Missing values are `NaN`. The exponential smoother is recursive with no
//! bias adjustment and seeds from the first observed value. A missing input
//! repeats the previous output while the decay keeps accruing, so the first
//! observation after a gap is weighted against an older estimate.

/// Smoothing factor for a span: `2 / (span + 1)`.
#[must_use]
pub fn span_alpha(span: usize) -> f64 {
    2.0 / (span as f64 + 1.0)
}

/// Wilder's smoothing factor: `1 / period`.
#[must_use]
pub fn wilder_alpha(period: usize) -> f64 {
    1.0 / period as f64
}

/// Recursive exponential moving average with smoothing factor `alpha`.
#[must_use]
pub fn ewm(values: &[f64], alpha: f64) -> Vec<f64> {
    let decay = 1.0 - alpha;
    let mut out = Vec::with_capacity(values.len());
    let mut weighted = f64::NAN;
    let mut old_weight = 1.0;

    for &value in values {
        if weighted.is_nan() {
            weighted = value;
        } else {
            old_weight *= decay;
            if !value.is_nan() {
                if weighted != value {
                    weighted = (old_weight * weighted + alpha * value) / (old_weight + alpha);
                }
                old_weight = 1.0;
            }
        }
        out.push(weighted);
    }

    out
}

/// EMA over a span, `α = 2/(span+1)`.
#[must_use]
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    ewm(values, span_alpha(span))
}

/// Wilder-smoothed average, `α = 1/period`.
#[must_use]
pub fn wilder(values: &[f64], period: usize) -> Vec<f64> {
    ewm(values, wilder_alpha(period))
}

/// Trailing mean over `window` values; `NaN` until the window is full or when
/// any value in it is missing.
#[must_use]
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |slice| {
        slice.iter().sum::<f64>() / slice.len() as f64
    })
}

/// Trailing maximum over `window` values.
#[must_use]
pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |slice| {
        slice.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

/// Trailing minimum over `window` values.
#[must_use]
pub fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |slice| {
        slice.iter().copied().fold(f64::INFINITY, f64::min)
    })
}

fn rolling(values: &[f64], window: usize, reduce: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return f64::NAN;
            }
            let slice = &values[i + 1 - window..=i];
            if slice.iter().any(|v| v.is_nan()) {
                f64::NAN
            } else {
                reduce(slice)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn ewm_seeds_from_first_value() {
        let out = ema(&[10.0, 10.0, 10.0], 5);
        assert!(out.iter().all(|v| close(*v, 10.0)));
    }

    #[test]
    fn ewm_matches_recursive_form_without_gaps() {
        let alpha = span_alpha(3);
        let out = ewm(&[1.0, 2.0, 3.0], alpha);
        let second = alpha * 2.0 + (1.0 - alpha) * 1.0;
        let third = alpha * 3.0 + (1.0 - alpha) * second;
        assert!(close(out[1], second));
        assert!(close(out[2], third));
    }

    #[test]
    fn ewm_leading_gap_stays_missing_until_first_observation() {
        let out = wilder(&[f64::NAN, f64::NAN, 4.0, 4.0], 14);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert!(close(out[2], 4.0));
        assert!(close(out[3], 4.0));
    }

    #[test]
    fn ewm_carries_value_through_gap_and_accrues_decay() {
        let alpha = 0.5;
        let out = ewm(&[0.0, f64::NAN, 8.0], alpha);
        assert!(close(out[1], 0.0));
        // Two decay steps before the observation: old weight 0.25.
        let expected = (0.25 * 0.0 + 0.5 * 8.0) / (0.25 + 0.5);
        assert!(close(out[2], expected));
    }

    #[test]
    fn rolling_windows_fill_after_window_values() {
        let values = [1.0, 5.0, 3.0, 2.0];
        let mean = rolling_mean(&values, 2);
        assert!(mean[0].is_nan());
        assert!(close(mean[1], 3.0));
        assert!(close(rolling_max(&values, 3)[3], 5.0));
        assert!(close(rolling_min(&values, 3)[3], 2.0));
    }
}
