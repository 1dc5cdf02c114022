use scanner_core::{Bar, CompanyProfile, MarketDataProvider, NewsArticle, ScannerError};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub mod screener;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use screener::{
    evaluate, run_all_scans, run_scan, AllScans, BreakoutSetupCriteria, EpisodicPivotCriteria,
    MomentumCriteria, MomentumPeriod, RuleOutcome, ScanResult, ScanRule, DEFAULT_SCAN_ALL_LIMIT,
    DEFAULT_SCAN_LIMIT,
};
pub use snapshot::{build_snapshot, is_ep_candidate, try_build_snapshot, Snapshot};

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Worker pool size for single-rule scans.
    pub concurrency: usize,
    /// Worker pool size for scan-all.
    pub batch_concurrency: usize,
    /// Calendar days of history requested per symbol.
    pub lookback_days: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            batch_concurrency: 15,
            lookback_days: 400,
        }
    }
}

/// Fetches history for a symbol universe and runs the scan rule sets over it.
///
/// The universe is always supplied by the caller.
pub struct ScannerService {
    provider: Arc<dyn MarketDataProvider>,
    config: ScannerConfig,
}

impl ScannerService {
    pub fn new(provider: Arc<dyn MarketDataProvider>, config: ScannerConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Build a snapshot for every symbol using at most `concurrency` workers.
    ///
    /// Symbols that fail are logged and dropped. Snapshots come back in input
    /// order regardless of which worker finishes first, so ranking ties are
    /// reproducible.
    pub async fn fetch_snapshots(&self, symbols: &[String], concurrency: usize) -> Vec<Snapshot> {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = symbols.iter().filter(|s| seen.insert(s.as_str())).collect();
        let total = unique.len();

        tracing::info!("Fetching {} symbols (concurrency {})", total, concurrency.max(1));

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, symbol) in unique.into_iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let symbol = symbol.clone();
            let lookback_days = self.config.lookback_days;

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    let closed = ScannerError::ApiError("worker pool closed".to_string());
                    return (index, symbol, Err(closed));
                };
                let result = fetch_snapshot(provider.as_ref(), &symbol, lookback_days).await;
                (index, symbol, result)
            });
        }

        let mut completed = Vec::with_capacity(total);

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok((index, _symbol, Ok(snapshot))) => completed.push((index, snapshot)),
                Ok((_index, symbol, Err(e))) => {
                    tracing::warn!("Skipping {}: {}", symbol, e);
                }
                Err(e) => {
                    tracing::error!("Task error: {}", e);
                }
            }
        }

        completed.sort_unstable_by_key(|(index, _)| *index);
        let snapshots: Vec<Snapshot> = completed.into_iter().map(|(_, snapshot)| snapshot).collect();

        tracing::info!("{}/{} symbols produced snapshots", snapshots.len(), total);
        snapshots
    }

    pub async fn scan_episodic_pivot(
        &self,
        symbols: &[String],
        criteria: EpisodicPivotCriteria,
        limit: usize,
    ) -> ScanResult {
        self.scan(symbols, ScanRule::EpisodicPivot(criteria), limit).await
    }

    pub async fn scan_momentum(
        &self,
        symbols: &[String],
        criteria: MomentumCriteria,
        limit: usize,
    ) -> ScanResult {
        self.scan(symbols, ScanRule::Momentum(criteria), limit).await
    }

    pub async fn scan_breakout_setup(
        &self,
        symbols: &[String],
        criteria: BreakoutSetupCriteria,
        limit: usize,
    ) -> ScanResult {
        self.scan(symbols, ScanRule::BreakoutSetup(criteria), limit).await
    }

    /// All rule sets over a single fetch batch.
    pub async fn scan_all(&self, symbols: &[String], limit: usize) -> AllScans {
        let snapshots = self
            .fetch_snapshots(symbols, self.config.batch_concurrency)
            .await;
        run_all_scans(&snapshots, limit)
    }

    async fn scan(&self, symbols: &[String], rule: ScanRule, limit: usize) -> ScanResult {
        let snapshots = self.fetch_snapshots(symbols, self.config.concurrency).await;
        let result = run_scan(&rule, &snapshots, limit);

        tracing::info!(
            "{}: {}/{} snapshots matched, returning {}",
            result.scan_type,
            result.count,
            snapshots.len(),
            result.results.len()
        );
        result
    }

    /// Snapshot for one symbol, bypassing the worker pool and the rules.
    pub async fn get_snapshot(&self, symbol: &str) -> Result<Snapshot, ScannerError> {
        let symbol = symbol.trim().to_uppercase();
        match fetch_snapshot(self.provider.as_ref(), &symbol, self.config.lookback_days).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                tracing::warn!("No snapshot for {}: {}", symbol, e);
                Err(ScannerError::NotFound(format!("Stock {} not found", symbol)))
            }
        }
    }

    pub async fn news(&self, symbol: &str, limit: usize) -> Result<Vec<NewsArticle>, ScannerError> {
        let symbol = symbol.trim().to_uppercase();
        let mut articles = self.provider.news(&symbol, limit).await?;
        articles.truncate(limit);
        Ok(articles)
    }
}

/// Fetch history and metadata together and build the snapshot.
async fn fetch_snapshot(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    lookback_days: u32,
) -> Result<Snapshot, ScannerError> {
    let (bars, profile): (Result<Vec<Bar>, _>, Result<CompanyProfile, _>) = tokio::join!(
        provider.price_history(symbol, lookback_days),
        provider.company_profile(symbol),
    );
    let bars = bars?;
    if bars.is_empty() {
        return Err(ScannerError::InsufficientData(format!("no history for {}", symbol)));
    }
    let profile = profile?;

    try_build_snapshot(symbol, &bars, &profile, chrono::Utc::now())
}
