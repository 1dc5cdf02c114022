use async_trait::async_trait;
use crate::{Bar, CompanyProfile, NewsArticle, ScannerError};

/// External market-data collaborator.
///
/// Implementations own their transport concerns (timeouts, throttling). The
/// scanner treats every error as final for the current invocation.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily bars covering roughly the last `lookback_days` calendar days,
    /// oldest first. An unknown symbol may yield an empty vector or an error.
    async fn price_history(&self, symbol: &str, lookback_days: u32) -> Result<Vec<Bar>, ScannerError>;

    /// Sparse company metadata; absent keys are `None`.
    async fn company_profile(&self, symbol: &str) -> Result<CompanyProfile, ScannerError>;

    /// Most recent news for a symbol, newest first.
    async fn news(&self, symbol: &str, limit: usize) -> Result<Vec<NewsArticle>, ScannerError>;
}
