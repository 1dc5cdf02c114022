use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use scanner_core::ScannerError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use technical_analysis::{ONE_MONTH_BARS, SIX_MONTH_BARS, THREE_MONTH_BARS};

pub const DEFAULT_SCAN_LIMIT: usize = 50;
pub const DEFAULT_SCAN_ALL_LIMIT: usize = 25;
pub const DEFAULT_MIN_AVG_VOLUME: u64 = 500_000;

/// Momentum lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MomentumPeriod {
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "3m")]
    ThreeMonth,
    #[serde(rename = "6m")]
    SixMonth,
}

impl MomentumPeriod {
    pub const ALL: [MomentumPeriod; 3] = [
        MomentumPeriod::OneMonth,
        MomentumPeriod::ThreeMonth,
        MomentumPeriod::SixMonth,
    ];

    pub fn lookback_bars(&self) -> usize {
        match self {
            MomentumPeriod::OneMonth => ONE_MONTH_BARS,
            MomentumPeriod::ThreeMonth => THREE_MONTH_BARS,
            MomentumPeriod::SixMonth => SIX_MONTH_BARS,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            MomentumPeriod::OneMonth => "1m",
            MomentumPeriod::ThreeMonth => "3m",
            MomentumPeriod::SixMonth => "6m",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MomentumPeriod::OneMonth => "1 Month",
            MomentumPeriod::ThreeMonth => "3 Month",
            MomentumPeriod::SixMonth => "6 Month",
        }
    }

    /// The snapshot field holding this period's return.
    pub fn value(&self, snapshot: &Snapshot) -> Option<f64> {
        match self {
            MomentumPeriod::OneMonth => snapshot.momentum_1m,
            MomentumPeriod::ThreeMonth => snapshot.momentum_3m,
            MomentumPeriod::SixMonth => snapshot.momentum_6m,
        }
    }
}

impl fmt::Display for MomentumPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for MomentumPeriod {
    type Err = ScannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(MomentumPeriod::OneMonth),
            "3m" => Ok(MomentumPeriod::ThreeMonth),
            "6m" => Ok(MomentumPeriod::SixMonth),
            other => Err(ScannerError::InvalidParameter(format!(
                "Period must be 1m, 3m, or 6m (got '{}')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodicPivotCriteria {
    pub min_gap: f64,
    pub min_volume_ratio: f64,
}

impl Default for EpisodicPivotCriteria {
    fn default() -> Self {
        Self {
            min_gap: 10.0,
            min_volume_ratio: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumCriteria {
    pub period: MomentumPeriod,
    pub min_momentum: f64,
    pub min_volume: u64,
}

impl MomentumCriteria {
    pub fn new(period: MomentumPeriod) -> Self {
        Self {
            period,
            min_momentum: 0.0,
            min_volume: DEFAULT_MIN_AVG_VOLUME,
        }
    }
}

/// Stage-2 breakout conditions: stacked averages near the 52-week high on a
/// volatile, liquid name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakoutSetupCriteria {
    /// Lowest allowed distance from the 52-week high, in percent.
    pub min_distance_from_high: f64,
    pub min_adr_percent: f64,
    pub min_rsi: f64,
    pub min_avg_volume: u64,
}

impl Default for BreakoutSetupCriteria {
    fn default() -> Self {
        Self {
            min_distance_from_high: -25.0,
            min_adr_percent: 5.0,
            min_rsi: 50.0,
            min_avg_volume: DEFAULT_MIN_AVG_VOLUME,
        }
    }
}

/// A named filter with its ranking key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanRule {
    EpisodicPivot(EpisodicPivotCriteria),
    Momentum(MomentumCriteria),
    BreakoutSetup(BreakoutSetupCriteria),
}

impl ScanRule {
    pub fn scan_type(&self) -> String {
        match self {
            ScanRule::EpisodicPivot(_) => "Episodic Pivot (EP)".to_string(),
            ScanRule::Momentum(c) => format!("Qullamaggie {} Momentum", c.period.label()),
            ScanRule::BreakoutSetup(_) => "Qullamaggie Breakout Setup".to_string(),
        }
    }

    pub fn matches(&self, s: &Snapshot) -> bool {
        match self {
            ScanRule::EpisodicPivot(c) => {
                s.gap_percent >= c.min_gap && s.volume_ratio >= c.min_volume_ratio
            }
            ScanRule::Momentum(c) => match c.period.value(s) {
                Some(m) => m >= c.min_momentum && s.avg_volume >= c.min_volume,
                None => false,
            },
            ScanRule::BreakoutSetup(c) => breakout_setup_matches(c, s),
        }
    }

    /// Ranking key, descending. Non-finite keys rank like missing ones.
    pub fn sort_key(&self, s: &Snapshot) -> Option<f64> {
        let key = match self {
            ScanRule::EpisodicPivot(_) => Some(s.gap_percent),
            ScanRule::Momentum(c) => c.period.value(s),
            ScanRule::BreakoutSetup(_) => s.momentum_1m,
        };
        key.filter(|k| k.is_finite())
    }
}

fn breakout_setup_matches(c: &BreakoutSetupCriteria, s: &Snapshot) -> bool {
    let (Some(sma_50), Some(sma_150), Some(sma_200), Some(adr), Some(rsi)) =
        (s.sma_50, s.sma_150, s.sma_200, s.adr_percent, s.rsi)
    else {
        return false;
    };

    let near_high = s
        .distance_from_52w_high
        .is_some_and(|d| d >= c.min_distance_from_high);

    s.price > sma_200
        && sma_150 > sma_200
        && sma_50 > sma_150
        && near_high
        && adr >= c.min_adr_percent
        && rsi >= c.min_rsi
        && s.avg_volume >= c.min_avg_volume
}

/// Filtered and ranked snapshots plus the match count before truncation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub matches: Vec<Snapshot>,
    pub count: usize,
}

/// Filter `snapshots` by `rule`, rank descending by its key, keep `limit`.
///
/// The result only depends on the input order for equal keys, which keep
/// their encounter order. Missing keys rank last.
pub fn evaluate(rule: &ScanRule, snapshots: &[Snapshot], limit: usize) -> RuleOutcome {
    let mut matches: Vec<Snapshot> = snapshots
        .iter()
        .filter(|s| rule.matches(s))
        .cloned()
        .collect();

    // sort_by is stable
    matches.sort_by(|a, b| descending(rule.sort_key(a), rule.sort_key(b)));

    let count = matches.len();
    matches.truncate(limit);

    RuleOutcome { matches, count }
}

fn descending(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub scan_type: String,
    pub results: Vec<Snapshot>,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

impl ScanResult {
    pub fn new(scan_type: impl Into<String>, outcome: RuleOutcome, timestamp: DateTime<Utc>) -> Self {
        Self {
            scan_type: scan_type.into(),
            results: outcome.matches,
            count: outcome.count,
            timestamp,
        }
    }
}

/// Run one rule over a batch and wrap it with its label.
pub fn run_scan(rule: &ScanRule, snapshots: &[Snapshot], limit: usize) -> ScanResult {
    ScanResult::new(rule.scan_type(), evaluate(rule, snapshots, limit), Utc::now())
}

/// Every rule set over one shared batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllScans {
    pub ep: ScanResult,
    pub momentum_1m: ScanResult,
    pub momentum_3m: ScanResult,
    pub momentum_6m: ScanResult,
    pub qullamaggie_setup: ScanResult,
}

pub fn run_all_scans(snapshots: &[Snapshot], limit: usize) -> AllScans {
    let timestamp = Utc::now();

    let momentum = |period: MomentumPeriod| {
        let rule = ScanRule::Momentum(MomentumCriteria::new(period));
        ScanResult::new(
            format!("{} Momentum Leaders", period.label()),
            evaluate(&rule, snapshots, limit),
            timestamp,
        )
    };

    let ep = ScanRule::EpisodicPivot(EpisodicPivotCriteria::default());
    let setup = ScanRule::BreakoutSetup(BreakoutSetupCriteria::default());

    AllScans {
        ep: ScanResult::new(ep.scan_type(), evaluate(&ep, snapshots, limit), timestamp),
        momentum_1m: momentum(MomentumPeriod::OneMonth),
        momentum_3m: momentum(MomentumPeriod::ThreeMonth),
        momentum_6m: momentum(MomentumPeriod::SixMonth),
        qullamaggie_setup: ScanResult::new(
            setup.scan_type(),
            evaluate(&setup, snapshots, limit),
            timestamp,
        ),
    }
}
