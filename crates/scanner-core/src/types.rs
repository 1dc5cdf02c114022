use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Company metadata as reported by the data provider.
///
/// Every field is optional: providers return a sparse view and the snapshot
/// builder decides per field how absence is represented. Growth rates are
/// fractions (0.25 = 25%).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub short_name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub trailing_eps: Option<f64>,
    pub earnings_quarterly_growth: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub market_cap: Option<f64>,
    pub recommendation_key: Option<String>,
    pub target_mean_price: Option<f64>,
}

/// News article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published: DateTime<Utc>,
    pub summary: Option<String>,
}
