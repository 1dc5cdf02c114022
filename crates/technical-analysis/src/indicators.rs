//! Indicator engine.
//!
//! Every function works on an ascending series (oldest first, one entry per
//! trading day) and returns full precision. `None` means the lookback window
//! is longer than the available history; it is never replaced by zero.

use scanner_core::Bar;

/// Trading bars in one month, three months and six months.
pub const ONE_MONTH_BARS: usize = 21;
pub const THREE_MONTH_BARS: usize = 63;
pub const SIX_MONTH_BARS: usize = 126;

/// Trading bars in one year, used for the 52-week high.
pub const FIFTY_TWO_WEEK_BARS: usize = 252;

pub const RSI_PERIOD: usize = 14;
pub const ADR_PERIOD: usize = 20;

/// Mean of the last `period` values.
pub fn sma_last(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period {
        return None;
    }
    let window = &data[data.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Relative Strength Index over the latest `period` price changes.
///
/// Gains and losses are averaged with a simple rolling mean rather than
/// Wilder's exponential smoothing. A window without losses reads 100, a
/// completely flat window reads 50.
pub fn rsi(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period + 1 {
        return None;
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = data
        .windows(2)
        .map(|w| {
            let change = w[1] - w[0];
            (change.max(0.0), (-change).max(0.0))
        })
        .unzip();

    let avg_gain = sma_last(&gains, period)?;
    let avg_loss = sma_last(&losses, period)?;

    let value = rsi_from_averages(avg_gain, avg_loss);
    value.is_finite().then_some(value)
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain > 0.0 { 100.0 } else { 50.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Average Daily Range in percent: mean of `(high - low) / low * 100` over
/// the latest `period` bars.
///
/// A non-positive low inside the window makes the range undefined.
pub fn adr_percent(highs: &[f64], lows: &[f64], period: usize) -> Option<f64> {
    let len = highs.len().min(lows.len());
    if period == 0 || len < period {
        return None;
    }

    let highs = &highs[highs.len() - period..];
    let lows = &lows[lows.len() - period..];
    if lows.iter().any(|&l| l <= 0.0) {
        return None;
    }

    let ranges: Vec<f64> = highs
        .iter()
        .zip(lows)
        .map(|(h, l)| (h - l) / l * 100.0)
        .collect();
    sma_last(&ranges, period)
}

/// Percent change from `reference` to `value`.
pub fn percent_change(reference: f64, value: f64) -> Option<f64> {
    if reference == 0.0 || !reference.is_finite() || !value.is_finite() {
        return None;
    }
    Some((value - reference) / reference * 100.0)
}

/// Percent return from the close `lookback` bars ago to the latest close.
pub fn momentum(closes: &[f64], lookback: usize) -> Option<f64> {
    if closes.len() < lookback + 1 {
        return None;
    }
    let last = closes[closes.len() - 1];
    let past = closes[closes.len() - 1 - lookback];
    percent_change(past, last)
}

/// Percent distance of `close` from the highest high of the trailing
/// `window` bars. Shorter histories use every bar available.
pub fn distance_from_high(close: f64, highs: &[f64], window: usize) -> Option<f64> {
    let start = highs.len().saturating_sub(window);
    let max_high = highs[start..]
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |m| m.max(h))))?;
    percent_change(max_high, close)
}

/// Opening gap of the latest bar against the prior close, in percent.
/// Zero when fewer than two bars exist or the prior close is unusable.
pub fn gap_percent(bars: &[Bar]) -> f64 {
    match bars {
        [.., yesterday, today] => percent_change(yesterday.close, today.open).unwrap_or(0.0),
        _ => 0.0,
    }
}
