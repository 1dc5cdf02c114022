//! Pure mapping from Yahoo JSON payloads to domain types.

use chrono::DateTime;
use scanner_core::{Bar, CompanyProfile, NewsArticle, ScannerError};
use serde_json::Value;

pub const MAX_SUMMARY_CHARS: usize = 500;

/// Daily bars from a `v8/finance/chart` response. Rows with any null field are skipped.
pub fn parse_chart(json: &Value) -> Result<Vec<Bar>, ScannerError> {
    if let Some(description) = json
        .pointer("/chart/error/description")
        .and_then(|v| v.as_str())
    {
        return Err(ScannerError::ApiError(description.to_string()));
    }

    let chart = json
        .pointer("/chart/result/0")
        .ok_or_else(|| ScannerError::ApiError("No chart data found".to_string()))?;

    // A symbol with no trading history returns a result without timestamps
    let Some(timestamps) = chart.get("timestamp").and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };

    let quote = chart
        .pointer("/indicators/quote/0")
        .ok_or_else(|| ScannerError::ApiError("No quote data found".to_string()))?;

    let opens = series(quote, "open")?;
    let highs = series(quote, "high")?;
    let lows = series(quote, "low")?;
    let closes = series(quote, "close")?;
    let volumes = series(quote, "volume")?;

    let mut bars = Vec::with_capacity(timestamps.len());

    for (i, ts) in timestamps.iter().enumerate() {
        let field = |s: &Vec<Value>| s.get(i).and_then(|v| v.as_f64());

        if let (Some(ts), Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
            ts.as_i64(),
            field(opens),
            field(highs),
            field(lows),
            field(closes),
            field(volumes),
        ) {
            let Some(timestamp) = DateTime::from_timestamp(ts, 0) else {
                continue;
            };
            bars.push(Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            });
        }
    }

    Ok(bars)
}

/// Company metadata from a `v10/finance/quoteSummary` response.
///
/// A rejected crumb arrives as a top-level `finance.error` body rather than
/// inside `quoteSummary`.
pub fn parse_quote_summary(json: &Value) -> Result<CompanyProfile, ScannerError> {
    if let Some(description) = ["/quoteSummary/error/description", "/finance/error/description"]
        .iter()
        .find_map(|path| json.pointer(path).and_then(|v| v.as_str()))
    {
        return Err(ScannerError::ApiError(description.to_string()));
    }

    let result = json
        .pointer("/quoteSummary/result/0")
        .ok_or_else(|| ScannerError::ApiError("No quote summary found".to_string()))?;

    let price = result.get("price");
    let asset_profile = result.get("assetProfile");
    let financial_data = result.get("financialData");
    let key_stats = result.get("defaultKeyStatistics");
    let summary_detail = result.get("summaryDetail");

    Ok(CompanyProfile {
        short_name: text(price, "shortName").or_else(|| text(price, "longName")),
        sector: text(asset_profile, "sector"),
        industry: text(asset_profile, "industry"),
        trailing_eps: raw(key_stats, "trailingEps"),
        earnings_quarterly_growth: raw(key_stats, "earningsQuarterlyGrowth"),
        revenue_growth: raw(financial_data, "revenueGrowth"),
        trailing_pe: raw(summary_detail, "trailingPE"),
        market_cap: raw(price, "marketCap").or_else(|| raw(summary_detail, "marketCap")),
        recommendation_key: text(financial_data, "recommendationKey"),
        target_mean_price: raw(financial_data, "targetMeanPrice"),
    })
}

/// Articles from the `v1/finance/search` response's `news` array.
pub fn parse_news(json: &Value, limit: usize) -> Vec<NewsArticle> {
    let Some(items) = json.get("news").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let title = text(Some(item), "title")?;
            let published = item
                .get("providerPublishTime")
                .and_then(|v| v.as_i64())
                .and_then(|ts| DateTime::from_timestamp(ts, 0))?;
            let summary = text(Some(item), "summary").unwrap_or_else(|| title.clone());

            Some(NewsArticle {
                url: text(Some(item), "link").unwrap_or_default(),
                source: text(Some(item), "publisher").unwrap_or_else(|| "Unknown".to_string()),
                published,
                summary: Some(truncate_chars(&summary, MAX_SUMMARY_CHARS)),
                title,
            })
        })
        .take(limit)
        .collect()
}

/// Body of `v1/test/getcrumb`: a bare token. Anything else is a refusal page.
pub fn parse_crumb(body: &str) -> Result<String, ScannerError> {
    let crumb = body.trim();
    if crumb.is_empty()
        || crumb.starts_with('{')
        || crumb.starts_with('<')
        || crumb.chars().any(char::is_whitespace)
    {
        return Err(ScannerError::ApiError(format!(
            "Yahoo refused a crumb: {}",
            truncate_chars(crumb, 80)
        )));
    }
    Ok(crumb.to_string())
}

/// Whether a quoteSummary failure means the session crumb went stale.
pub fn is_crumb_error(error: &ScannerError) -> bool {
    match error {
        ScannerError::ApiError(message) => {
            let message = message.to_ascii_lowercase();
            message.contains("crumb") || message.contains("401")
        }
        _ => false,
    }
}

fn series<'a>(quote: &'a Value, name: &str) -> Result<&'a Vec<Value>, ScannerError> {
    quote
        .get(name)
        .and_then(|v| v.as_array())
        .ok_or_else(|| ScannerError::ApiError(format!("No {} series", name)))
}

/// Numbers come either bare or wrapped as `{ "raw": 1.23, "fmt": "1.23" }`.
fn raw(module: Option<&Value>, key: &str) -> Option<f64> {
    let value = module?.get(key)?;
    value
        .get("raw")
        .and_then(|v| v.as_f64())
        .or_else(|| value.as_f64())
        .filter(|v| v.is_finite())
}

fn text(value: Option<&Value>, key: &str) -> Option<String> {
    value?
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
