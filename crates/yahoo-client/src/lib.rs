use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Client;
use scanner_core::{Bar, CompanyProfile, MarketDataProvider, NewsArticle, ScannerError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

mod parse;
mod rate_limiter;

pub use parse::{
    is_crumb_error, parse_chart, parse_crumb, parse_news, parse_quote_summary, MAX_SUMMARY_CHARS,
};
use rate_limiter::RateLimiter;

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query2.finance.yahoo.com/v1/test/getcrumb";

const SUMMARY_MODULES: &str = "price,assetProfile,financialData,defaultKeyStatistics,summaryDetail";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const MAX_ATTEMPTS: u32 = 3;
const RETRY_WAIT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct YahooConfig {
    /// Requests allowed per minute.
    pub rate_limit: usize,
    pub timeout_secs: u64,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            rate_limit: 120,
            timeout_secs: 30,
        }
    }
}

/// Yahoo Finance market data over the public chart, quoteSummary and search endpoints.
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    rate_limiter: RateLimiter,
    /// quoteSummary session token, tied to the cookie in `client`'s jar.
    crumb: Arc<Mutex<Option<String>>>,
}

impl YahooClient {
    pub fn new(config: YahooConfig) -> Result<Self, ScannerError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScannerError::ApiError(format!("Failed to build HTTP client: {}", e)))?;

        tracing::info!(
            "Yahoo client ready ({} req/min, {}s timeout)",
            config.rate_limit,
            config.timeout_secs
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::new(config.rate_limit, Duration::from_secs(60)),
            crumb: Arc::new(Mutex::new(None)),
        })
    }

    /// Send a request through the rate limiter, retrying HTTP 429.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ScannerError> {
        let request = builder.build().map_err(|e| ScannerError::ApiError(e.to_string()))?;

        for attempt in 1..=MAX_ATTEMPTS {
            self.rate_limiter.acquire().await;
            let attempt_request = request
                .try_clone()
                .ok_or_else(|| ScannerError::ApiError("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(attempt_request)
                .await
                .map_err(|e| ScannerError::ApiError(e.to_string()))?;

            if response.status() != reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            let Some(wait) = retry_delay(attempt) else {
                break;
            };
            tracing::warn!(
                "Yahoo returned 429 for {}, retry {}/{} in {}s",
                request.url().path(),
                attempt,
                MAX_ATTEMPTS - 1,
                wait.as_secs()
            );
            tokio::time::sleep(wait).await;
        }

        Err(ScannerError::ApiError(format!(
            "Rate limited by Yahoo after {} attempts",
            MAX_ATTEMPTS
        )))
    }

    /// Cached crumb, fetched on first use. The lock is held across the fetch
    /// so concurrent workers share one session.
    async fn crumb(&self) -> Result<String, ScannerError> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // Only the session cookie matters here; the page itself is a 404
        self.send_request(self.client.get(COOKIE_URL)).await?;

        let response = self.send_request(self.client.get(CRUMB_URL)).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ScannerError::ApiError(e.to_string()))?;
        if !status.is_success() {
            return Err(ScannerError::ApiError(format!("Crumb request failed: HTTP {}", status)));
        }

        let crumb = parse_crumb(&body)?;
        tracing::debug!("Obtained Yahoo crumb");
        *cached = Some(crumb.clone());
        Ok(crumb)
    }

    /// Forget `stale` unless another worker already replaced it.
    async fn invalidate_crumb(&self, stale: &str) {
        let mut cached = self.crumb.lock().await;
        if cached.as_deref() == Some(stale) {
            *cached = None;
        }
    }

    async fn fetch_quote_summary(&self, symbol: &str) -> Result<CompanyProfile, ScannerError> {
        let url = format!("{}/{}", QUOTE_SUMMARY_URL, symbol);
        let crumb = self.crumb().await?;
        let json = self
            .get_json(
                self.client
                    .get(&url)
                    .query(&[("modules", SUMMARY_MODULES), ("crumb", crumb.as_str())]),
            )
            .await?;

        let profile = parse_quote_summary(&json);
        if let Err(e) = &profile {
            if is_crumb_error(e) {
                self.invalidate_crumb(&crumb).await;
            }
        }
        profile
    }

    /// GET a JSON document. Error statuses are tolerated when Yahoo still
    /// returns its structured `error` body.
    async fn get_json(&self, builder: reqwest::RequestBuilder) -> Result<serde_json::Value, ScannerError> {
        let response = self.send_request(builder).await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ScannerError::ApiError(e.to_string()))?;

        match serde_json::from_str(&text) {
            Ok(json) => Ok(json),
            Err(_) if !status.is_success() => Err(ScannerError::ApiError(format!("HTTP {}", status))),
            Err(e) => Err(ScannerError::InvalidData(format!("Malformed Yahoo response: {}", e))),
        }
    }
}

#[async_trait]
impl MarketDataProvider for YahooClient {
    async fn price_history(&self, symbol: &str, lookback_days: u32) -> Result<Vec<Bar>, ScannerError> {
        let to = Utc::now();
        let from = to - ChronoDuration::days(i64::from(lookback_days));
        let url = format!("{}/{}", CHART_URL, symbol);

        let json = self
            .get_json(self.client.get(&url).query(&[
                ("period1", from.timestamp().to_string()),
                ("period2", to.timestamp().to_string()),
                ("interval", "1d".to_string()),
            ]))
            .await?;

        let bars = parse_chart(&json)?;
        tracing::debug!("{}: {} daily bars", symbol, bars.len());
        Ok(bars)
    }

    async fn company_profile(&self, symbol: &str) -> Result<CompanyProfile, ScannerError> {
        match self.fetch_quote_summary(symbol).await {
            Err(e) if is_crumb_error(&e) => {
                tracing::debug!("{}: stale crumb ({}), opening a new session", symbol, e);
                self.fetch_quote_summary(symbol).await
            }
            result => result,
        }
    }

    async fn news(&self, symbol: &str, limit: usize) -> Result<Vec<NewsArticle>, ScannerError> {
        let json = self
            .get_json(self.client.get(SEARCH_URL).query(&[
                ("q", symbol.to_string()),
                ("newsCount", limit.to_string()),
                ("quotesCount", "0".to_string()),
            ]))
            .await?;
        Ok(parse_news(&json, limit))
    }
}

/// Back-off before the next attempt, or `None` when `attempt` was the last.
fn retry_delay(attempt: u32) -> Option<Duration> {
    (attempt < MAX_ATTEMPTS).then(|| Duration::from_secs(RETRY_WAIT_SECS))
}
