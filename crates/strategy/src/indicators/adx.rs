use super::smoothing::{ema, wilder};
use super::supertrend::true_range;

pub const PERIOD: usize = 14;
pub const SIGNAL_SPAN: usize = 21;

#[derive(Debug, Clone, Default)]
pub struct AdxColumns {
    pub adx: Vec<f64>,
    pub adx_ema21: Vec<f64>,
}

/// Directional movement for row `i`; row 0 has no previous bar and yields 0.
fn directional_movement(high: &[f64], low: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut plus = Vec::with_capacity(high.len());
    let mut minus = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        if i == 0 {
            plus.push(0.0);
            minus.push(0.0);
            continue;
        }
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];
        plus.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });
    }

    (plus, minus)
}

/// ADX(14) with Wilder smoothing, and its EMA(21).
///
/// DX is missing wherever both directional indices are zero; the ADX
/// smoother carries its value across those rows.
#[must_use]
pub fn adx(high: &[f64], low: &[f64], close: &[f64]) -> AdxColumns {
    let tr14 = wilder(&true_range(high, low, close), PERIOD);
    let (plus_dm, minus_dm) = directional_movement(high, low);
    let plus_dm14 = wilder(&plus_dm, PERIOD);
    let minus_dm14 = wilder(&minus_dm, PERIOD);

    let dx: Vec<f64> = (0..high.len())
        .map(|i| {
            let plus_di = 100.0 * plus_dm14[i] / tr14[i];
            let minus_di = 100.0 * minus_dm14[i] / tr14[i];
            100.0 * (plus_di - minus_di).abs() / (plus_di + minus_di)
        })
        .collect();

    let adx = wilder(&dx, PERIOD);
    let adx_ema21 = ema(&adx, SIGNAL_SPAN);
    AdxColumns { adx, adx_ema21 }
}
