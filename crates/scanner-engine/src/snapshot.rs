use chrono::{DateTime, Utc};
use scanner_core::{Bar, CompanyProfile, ScannerError};
use serde::{Deserialize, Serialize};
use technical_analysis::{
    adr_percent, distance_from_high, gap_percent, momentum, percent_change, rsi, sma_last,
    ADR_PERIOD, FIFTY_TWO_WEEK_BARS, ONE_MONTH_BARS, RSI_PERIOD, SIX_MONTH_BARS,
    THREE_MONTH_BARS,
};

/// Minimum history for average volume and SMA-50.
pub const MIN_HISTORY_BARS: usize = 50;
/// Trailing window for the average volume.
pub const AVG_VOLUME_BARS: usize = 50;

/// Fixed thresholds of the episodic pivot flag. Independent of the tunable
/// episodic pivot rule.
pub const EP_FLAG_MIN_GAP: f64 = 10.0;
pub const EP_FLAG_MIN_VOLUME_RATIO: f64 = 2.0;

/// Computed indicators for one symbol at one point in time.
///
/// Percent fields are rounded to two decimals. `None` means the lookback
/// window did not fit in the available history (or the provider did not
/// report the value), never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,

    pub price: f64,
    pub prev_close: f64,
    pub change_percent: f64,
    pub volume: u64,
    pub avg_volume: u64,
    pub volume_ratio: f64,

    pub momentum_1m: Option<f64>,
    pub momentum_3m: Option<f64>,
    pub momentum_6m: Option<f64>,

    pub rsi: Option<f64>,
    pub adr_percent: Option<f64>,
    pub distance_from_20sma: Option<f64>,
    pub distance_from_50sma: Option<f64>,
    pub distance_from_150sma: Option<f64>,
    pub distance_from_200sma: Option<f64>,
    pub distance_from_52w_high: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_150: Option<f64>,
    pub sma_200: Option<f64>,

    pub eps: Option<f64>,
    /// Quarterly earnings growth in percent; 0 when not reported.
    pub eps_growth: f64,
    /// Revenue growth in percent; 0 when not reported.
    pub revenue_growth: f64,
    pub pe_ratio: Option<f64>,
    pub market_cap: Option<f64>,
    pub analyst_rating: Option<String>,
    pub target_price: Option<f64>,

    pub gap_percent: f64,
    pub is_ep_candidate: bool,

    pub last_updated: DateTime<Utc>,
}

/// Episodic pivot flag: gap of at least 10% on at least twice the average volume.
pub fn is_ep_candidate(gap_percent: f64, volume_ratio: f64) -> bool {
    gap_percent >= EP_FLAG_MIN_GAP && volume_ratio >= EP_FLAG_MIN_VOLUME_RATIO
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round_opt(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite()).map(round2)
}

/// Build a snapshot, reporting "no snapshot" for any failure.
pub fn build_snapshot(symbol: &str, bars: &[Bar], profile: &CompanyProfile) -> Option<Snapshot> {
    match try_build_snapshot(symbol, bars, profile, Utc::now()) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::debug!("No snapshot for {}: {}", symbol, e);
            None
        }
    }
}

pub fn try_build_snapshot(
    symbol: &str,
    bars: &[Bar],
    profile: &CompanyProfile,
    as_of: DateTime<Utc>,
) -> Result<Snapshot, ScannerError> {
    if bars.len() < MIN_HISTORY_BARS {
        return Err(ScannerError::InsufficientData(format!(
            "{} has {} bars, need {}",
            symbol,
            bars.len(),
            MIN_HISTORY_BARS
        )));
    }

    validate_bars(symbol, bars)?;

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let price = closes[closes.len() - 1];
    let prev_close = closes[closes.len() - 2];
    let change_percent = percent_change(prev_close, price).ok_or_else(|| {
        ScannerError::InvalidData(format!("{} has an unusable prior close", symbol))
    })?;

    let volume = volumes[volumes.len() - 1] as u64;
    let avg_volume = sma_last(&volumes, AVG_VOLUME_BARS).unwrap_or(0.0) as u64;
    let volume_ratio = if avg_volume > 0 {
        volume as f64 / avg_volume as f64
    } else {
        0.0
    };

    let sma_20 = sma_last(&closes, 20);
    let sma_50 = sma_last(&closes, 50);
    let sma_150 = sma_last(&closes, 150);
    let sma_200 = sma_last(&closes, 200);
    let distance = |sma: Option<f64>| sma.and_then(|s| percent_change(s, price));

    let gap = round2(gap_percent(bars));
    let volume_ratio = round2(volume_ratio);

    Ok(Snapshot {
        symbol: symbol.to_string(),
        name: profile
            .short_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| symbol.to_string()),
        sector: profile.sector.clone(),
        industry: profile.industry.clone(),

        price: round2(price),
        prev_close: round2(prev_close),
        change_percent: round2(change_percent),
        volume,
        avg_volume,
        volume_ratio,

        momentum_1m: round_opt(momentum(&closes, ONE_MONTH_BARS)),
        momentum_3m: round_opt(momentum(&closes, THREE_MONTH_BARS)),
        momentum_6m: round_opt(momentum(&closes, SIX_MONTH_BARS)),

        rsi: round_opt(rsi(&closes, RSI_PERIOD)),
        adr_percent: round_opt(adr_percent(&highs, &lows, ADR_PERIOD)),
        distance_from_20sma: round_opt(distance(sma_20)),
        distance_from_50sma: round_opt(distance(sma_50)),
        distance_from_150sma: round_opt(distance(sma_150)),
        distance_from_200sma: round_opt(distance(sma_200)),
        distance_from_52w_high: round_opt(distance_from_high(price, &highs, FIFTY_TWO_WEEK_BARS)),
        sma_20: round_opt(sma_20),
        sma_50: round_opt(sma_50),
        sma_150: round_opt(sma_150),
        sma_200: round_opt(sma_200),

        eps: round_opt(profile.trailing_eps),
        eps_growth: growth_percent(profile.earnings_quarterly_growth),
        revenue_growth: growth_percent(profile.revenue_growth),
        pe_ratio: round_opt(profile.trailing_pe),
        market_cap: profile.market_cap.filter(|v| v.is_finite()),
        analyst_rating: profile
            .recommendation_key
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_uppercase),
        target_price: round_opt(profile.target_mean_price),

        gap_percent: gap,
        is_ep_candidate: is_ep_candidate(gap, volume_ratio),

        last_updated: as_of,
    })
}

/// Growth fraction to percent. Absent growth reads as flat.
fn growth_percent(fraction: Option<f64>) -> f64 {
    fraction
        .filter(|g| g.is_finite())
        .map(|g| round2(g * 100.0))
        .unwrap_or(0.0)
}

fn validate_bars(symbol: &str, bars: &[Bar]) -> Result<(), ScannerError> {
    let bad = bars.iter().position(|b| {
        !(b.close.is_finite() && b.close > 0.0)
            || !(b.open.is_finite() && b.high.is_finite() && b.low.is_finite())
            || !(b.volume.is_finite() && b.volume >= 0.0)
    });

    match bad {
        Some(i) => Err(ScannerError::InvalidData(format!(
            "{} has a malformed bar at index {}",
            symbol, i
        ))),
        None => Ok(()),
    }
}
