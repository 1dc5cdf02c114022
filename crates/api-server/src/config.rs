use anyhow::{Context, Result};
use scanner_engine::ScannerConfig;
use std::env;
use yahoo_client::YahooConfig;

/// Liquid US large/mid caps plus high-volume momentum names.
pub const DEFAULT_UNIVERSE: &[&str] = &[
    // Tech
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "AMD", "INTC", "CRM",
    "ORCL", "ADBE", "NFLX", "PYPL", "SQ", "SHOP", "SNOW", "PLTR", "COIN", "RBLX",
    // Semis
    "AVGO", "QCOM", "TXN", "MU", "MRVL", "LRCX", "AMAT", "KLAC", "ASML", "ARM",
    // Software
    "NOW", "WDAY", "ZS", "CRWD", "PANW", "DDOG", "NET", "OKTA", "MDB", "SPLK",
    // Healthcare
    "UNH", "JNJ", "LLY", "PFE", "ABBV", "MRK", "TMO", "ABT", "DHR", "BMY",
    "MRNA", "BNTX", "REGN", "VRTX", "GILD", "BIIB", "AMGN", "ILMN", "ISRG", "DXCM",
    // Financials
    "JPM", "BAC", "WFC", "GS", "MS", "BLK", "SCHW", "AXP", "V", "MA",
    // Consumer
    "WMT", "COST", "HD", "LOW", "TGT", "NKE", "SBUX", "MCD", "YUM", "CMG",
    // Energy
    "XOM", "CVX", "COP", "SLB", "EOG", "OXY", "PSX", "VLO", "MPC", "DVN",
    // Industrials
    "CAT", "DE", "BA", "LMT", "RTX", "GE", "HON", "UPS", "FDX", "UNP",
    // Auto/EV
    "GM", "F", "RIVN", "LCID", "NIO", "LI", "XPEV",
    // AI infrastructure
    "SMCI", "VRT", "DELL", "HPE", "IONQ", "RGTI", "QUBT",
    // Retail/e-commerce
    "ETSY", "EBAY", "W", "CHWY", "DASH", "UBER", "LYFT", "ABNB",
    // Crypto-related
    "MSTR", "MARA", "RIOT", "CLSK", "HUT",
    // Media & communications
    "DIS", "CMCSA", "WBD", "PARA", "SPOT", "ROKU", "T", "VZ", "TMUS",
    // Momentum names
    "APP", "TTD", "DUOL", "CELH", "HIMS", "ONON", "DECK", "LULU", "BIRD",
    "AFRM", "SOFI", "HOOD", "UPST", "NU", "GRAB",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub universe: Vec<String>,
    pub cors_origins: Vec<String>,
    pub scanner: ScannerConfig,
    pub yahoo: YahooConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let universe = match env::var("SCANNER_UNIVERSE") {
            Ok(list) => parse_symbol_list(&list),
            Err(_) => DEFAULT_UNIVERSE.iter().map(|s| s.to_string()).collect(),
        };
        if universe.is_empty() {
            anyhow::bail!("SCANNER_UNIVERSE is set but contains no symbols");
        }

        let cors_origins = env::var("SCANNER_CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: env::var("SCANNER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SCANNER_PORT")
                .unwrap_or_else(|_| "8001".to_string())
                .parse()
                .context("SCANNER_PORT must be a port number")?,
            universe,
            cors_origins,
            scanner: ScannerConfig {
                concurrency: env::var("SCANNER_CONCURRENCY")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .context("SCANNER_CONCURRENCY must be a positive integer")?,
                batch_concurrency: env::var("SCANNER_BATCH_CONCURRENCY")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .context("SCANNER_BATCH_CONCURRENCY must be a positive integer")?,
                lookback_days: env::var("SCANNER_LOOKBACK_DAYS")
                    .unwrap_or_else(|_| "400".to_string())
                    .parse()
                    .context("SCANNER_LOOKBACK_DAYS must be a positive integer")?,
            },
            yahoo: YahooConfig {
                rate_limit: env::var("YAHOO_RATE_LIMIT")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .context("YAHOO_RATE_LIMIT must be requests per minute")?,
                timeout_secs: env::var("YAHOO_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("YAHOO_TIMEOUT_SECS must be a number of seconds")?,
            },
        })
    }
}

/// Comma separated symbols, upper-cased, blanks and repeats removed.
pub fn parse_symbol_list(list: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for symbol in list.split(',').map(|s| s.trim().to_uppercase()) {
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbol_list() {
        assert_eq!(
            parse_symbol_list(" aapl, MSFT,,nvda ,AAPL"),
            vec!["AAPL", "MSFT", "NVDA"]
        );
        assert!(parse_symbol_list(" , ").is_empty());
    }

    #[test]
    fn test_default_universe_has_no_duplicates() {
        let joined = DEFAULT_UNIVERSE.join(",");
        assert_eq!(parse_symbol_list(&joined).len(), DEFAULT_UNIVERSE.len());
    }
}
