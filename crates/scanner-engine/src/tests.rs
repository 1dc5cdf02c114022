#[cfg(test)]
mod scanner_service_tests {
    use crate::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory provider. Symbols without an entry fail like a network error.
    #[derive(Default)]
    struct StubProvider {
        bars: HashMap<String, Vec<Bar>>,
        profiles: HashMap<String, CompanyProfile>,
        news: HashMap<String, Vec<NewsArticle>>,
        /// Extra latency per symbol, in milliseconds.
        delays: HashMap<String, u64>,
        history_calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl StubProvider {
        fn with_symbol(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
            self.bars.insert(symbol.to_string(), bars);
            self.profiles.insert(
                symbol.to_string(),
                CompanyProfile {
                    short_name: Some(format!("{} Inc", symbol)),
                    ..CompanyProfile::default()
                },
            );
            self
        }
    }

    #[async_trait]
    impl MarketDataProvider for StubProvider {
        async fn price_history(&self, symbol: &str, _lookback_days: u32) -> Result<Vec<Bar>, ScannerError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let delay = 5 + self.delays.get(symbol).copied().unwrap_or(0);
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.bars
                .get(symbol)
                .cloned()
                .ok_or_else(|| ScannerError::ApiError(format!("connection reset for {}", symbol)))
        }

        async fn company_profile(&self, symbol: &str) -> Result<CompanyProfile, ScannerError> {
            Ok(self.profiles.get(symbol).cloned().unwrap_or_default())
        }

        async fn news(&self, symbol: &str, _limit: usize) -> Result<Vec<NewsArticle>, ScannerError> {
            self.news
                .get(symbol)
                .cloned()
                .ok_or_else(|| ScannerError::ApiError("news unavailable".to_string()))
        }
    }

    /// Closes compound by `daily_pct`; the last bar optionally gaps up on heavy volume.
    fn bars(n: usize, daily_pct: f64, gap_pct: Option<f64>) -> Vec<Bar> {
        let start = Utc::now() - Duration::days(n as i64);
        let mut bars: Vec<Bar> = (0..n)
            .map(|i| {
                let close = 50.0 * (1.0 + daily_pct / 100.0).powi(i as i32);
                Bar {
                    timestamp: start + Duration::days(i as i64),
                    open: close * 0.99,
                    high: close * 1.04,
                    low: close * 0.98,
                    close,
                    volume: 2_000_000.0,
                }
            })
            .collect();

        if let Some(gap) = gap_pct {
            let prior = bars[n - 2].close;
            let last = &mut bars[n - 1];
            last.open = prior * (1.0 + gap / 100.0);
            last.high = last.open * 1.05;
            last.low = last.open * 0.99;
            last.close = last.open * 1.02;
            last.volume = 9_000_000.0;
        }
        bars
    }

    fn universe(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    fn service(provider: StubProvider) -> (ScannerService, Arc<StubProvider>) {
        let provider = Arc::new(provider);
        let service = ScannerService::new(provider.clone(), ScannerConfig::default());
        (service, provider)
    }

    #[tokio::test]
    async fn test_failed_symbols_are_dropped() {
        let provider = StubProvider::default()
            .with_symbol("GOOD", bars(260, 0.3, None))
            .with_symbol("SHORT", bars(30, 0.3, None))
            .with_symbol("EMPTY", vec![]);
        let (service, _) = service(provider);

        let snapshots = service
            .fetch_snapshots(&universe(&["GOOD", "SHORT", "EMPTY", "MISSING"]), 4)
            .await;

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].symbol, "GOOD");
        assert_eq!(snapshots[0].name, "GOOD Inc");
    }

    #[tokio::test]
    async fn test_worker_pool_is_bounded() {
        let mut provider = StubProvider::default();
        let symbols: Vec<String> = (0..30).map(|i| format!("S{}", i)).collect();
        for s in &symbols {
            provider = provider.with_symbol(s, bars(60, 0.1, None));
        }
        let (service, provider) = service(provider);

        let snapshots = service.fetch_snapshots(&symbols, 3).await;

        assert_eq!(snapshots.len(), 30);
        assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_tied_ranking_ignores_completion_order() {
        for slow in ["AAA", "BBB"] {
            let mut provider = StubProvider::default()
                .with_symbol("AAA", bars(80, 0.4, None))
                .with_symbol("BBB", bars(80, 0.4, None));
            provider.delays.insert(slow.to_string(), 50);
            let (service, _) = service(provider);

            let result = service
                .scan_momentum(
                    &universe(&["AAA", "BBB"]),
                    MomentumCriteria::new(MomentumPeriod::OneMonth),
                    DEFAULT_SCAN_LIMIT,
                )
                .await;

            let names: Vec<&str> = result.results.iter().map(|s| s.symbol.as_str()).collect();
            assert_eq!(names, vec!["AAA", "BBB"], "slow symbol {}", slow);
        }
    }

    #[tokio::test]
    async fn test_snapshots_follow_input_order() {
        let mut provider = StubProvider::default();
        let symbols: Vec<String> = (0..8).map(|i| format!("T{}", i)).collect();
        for (i, s) in symbols.iter().enumerate() {
            provider = provider.with_symbol(s, bars(60, 0.1, None));
            provider.delays.insert(s.clone(), 40 - 5 * i as u64);
        }
        let (service, _) = service(provider);

        let snapshots = service.fetch_snapshots(&symbols, 8).await;

        let names: Vec<&str> = snapshots.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(names, vec!["T0", "T1", "T2", "T3", "T4", "T5", "T6", "T7"]);
    }

    #[tokio::test]
    async fn test_duplicate_symbols_fetched_once() {
        let provider = StubProvider::default().with_symbol("AAA", bars(60, 0.1, None));
        let (service, provider) = service(provider);

        let snapshots = service
            .fetch_snapshots(&universe(&["AAA", "AAA", "AAA"]), 2)
            .await;

        assert_eq!(snapshots.len(), 1);
        assert_eq!(provider.history_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scan_episodic_pivot() {
        let provider = StubProvider::default()
            .with_symbol("GAP", bars(80, 0.0, Some(15.0)))
            .with_symbol("SMALLGAP", bars(80, 0.0, Some(4.0)))
            .with_symbol("FLAT", bars(80, 0.0, None));
        let (service, _) = service(provider);

        let result = service
            .scan_episodic_pivot(
                &universe(&["GAP", "SMALLGAP", "FLAT"]),
                EpisodicPivotCriteria::default(),
                DEFAULT_SCAN_LIMIT,
            )
            .await;

        assert_eq!(result.scan_type, "Episodic Pivot (EP)");
        assert_eq!(result.count, 1);
        assert_eq!(result.results[0].symbol, "GAP");
        assert!(result.results[0].is_ep_candidate);

        // A looser rule admits the smaller gap without changing its flag
        let loose = service
            .scan_episodic_pivot(
                &universe(&["GAP", "SMALLGAP", "FLAT"]),
                EpisodicPivotCriteria { min_gap: 3.0, min_volume_ratio: 2.0 },
                DEFAULT_SCAN_LIMIT,
            )
            .await;
        let symbols: Vec<&str> = loose.results.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["GAP", "SMALLGAP"]);
        assert!(!loose.results[1].is_ep_candidate);
    }

    #[tokio::test]
    async fn test_scan_momentum_ranks_by_period() {
        let provider = StubProvider::default()
            .with_symbol("FAST", bars(200, 0.8, None))
            .with_symbol("SLOW", bars(200, 0.2, None))
            .with_symbol("DOWN", bars(200, -0.3, None))
            .with_symbol("YOUNG", bars(55, 2.0, None));
        let (service, _) = service(provider);
        let symbols = universe(&["FAST", "SLOW", "DOWN", "YOUNG"]);

        let one_month = service
            .scan_momentum(&symbols, MomentumCriteria::new(MomentumPeriod::OneMonth), 2)
            .await;
        let names: Vec<&str> = one_month.results.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(names, vec!["YOUNG", "FAST"]);
        assert_eq!(one_month.count, 3);

        // YOUNG lacks three months of history
        let three_month = service
            .scan_momentum(&symbols, MomentumCriteria::new(MomentumPeriod::ThreeMonth), 50)
            .await;
        let names: Vec<&str> = three_month.results.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(names, vec!["FAST", "SLOW"]);
        assert_eq!(three_month.scan_type, "Qullamaggie 3 Month Momentum");
    }

    #[tokio::test]
    async fn test_scan_breakout_setup() {
        // 4% + 2% daily range keeps ADR above 5%
        let provider = StubProvider::default()
            .with_symbol("TREND", bars(260, 0.3, None))
            .with_symbol("NOHISTORY", bars(120, 0.3, None))
            .with_symbol("DOWN", bars(260, -0.3, None));
        let (service, _) = service(provider);

        let result = service
            .scan_breakout_setup(
                &universe(&["TREND", "NOHISTORY", "DOWN"]),
                BreakoutSetupCriteria::default(),
                DEFAULT_SCAN_LIMIT,
            )
            .await;

        assert_eq!(result.count, 1);
        assert_eq!(result.results[0].symbol, "TREND");
    }

    #[tokio::test]
    async fn test_scan_all_fetches_once() {
        let provider = StubProvider::default()
            .with_symbol("A", bars(260, 0.3, None))
            .with_symbol("B", bars(260, 0.5, Some(12.0)))
            .with_symbol("C", bars(80, 0.1, None));
        let (service, provider) = service(provider);

        let all = service
            .scan_all(&universe(&["A", "B", "C"]), DEFAULT_SCAN_ALL_LIMIT)
            .await;

        assert_eq!(provider.history_calls.load(Ordering::SeqCst), 3);
        assert_eq!(all.ep.count, 1);
        assert_eq!(all.ep.results[0].symbol, "B");
        assert_eq!(all.momentum_1m.count, 3);
        assert_eq!(all.momentum_6m.count, 2);
    }

    #[tokio::test]
    async fn test_get_snapshot() {
        let provider = StubProvider::default()
            .with_symbol("AAPL", bars(100, 0.1, None))
            .with_symbol("GONE", vec![]);
        let (service, provider) = service(provider);

        let snap = service.get_snapshot("aapl").await.unwrap();
        assert_eq!(snap.symbol, "AAPL");

        let err = service.get_snapshot("GONE").await.unwrap_err();
        assert!(matches!(err, ScannerError::NotFound(_)));

        let err = service.get_snapshot("NOPE").await.unwrap_err();
        assert!(matches!(err, ScannerError::NotFound(_)));

        assert_eq!(provider.history_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_news_is_limited() {
        let mut provider = StubProvider::default();
        let articles: Vec<NewsArticle> = (0..5)
            .map(|i| NewsArticle {
                title: format!("Headline {}", i),
                url: format!("https://example.com/{}", i),
                source: "Wire".to_string(),
                published: Utc::now(),
                summary: None,
            })
            .collect();
        provider.news.insert("NVDA".to_string(), articles);
        let (service, _) = service(provider);

        let news = service.news("nvda", 2).await.unwrap();
        assert_eq!(news.len(), 2);
        assert_eq!(news[0].title, "Headline 0");

        assert!(service.news("XYZ", 2).await.is_err());
    }
}
