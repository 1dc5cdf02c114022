use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use scanner_core::NewsArticle;
use scanner_engine::{
    AllScans, BreakoutSetupCriteria, EpisodicPivotCriteria, MomentumCriteria, MomentumPeriod,
    ScanResult, Snapshot, DEFAULT_SCAN_ALL_LIMIT, DEFAULT_SCAN_LIMIT,
};
use serde::Deserialize;

use crate::{scanner_err, ApiResponse, AppError, AppState};

const DEFAULT_NEWS_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Query params
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EpisodicPivotQuery {
    #[serde(default = "default_min_gap")]
    pub min_gap: f64,
    #[serde(default = "default_min_volume_ratio")]
    pub min_volume_ratio: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct MomentumQuery {
    #[serde(default)]
    pub min_momentum: f64,
    #[serde(default = "default_min_volume")]
    pub min_volume: u64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

fn default_min_gap() -> f64 {
    EpisodicPivotCriteria::default().min_gap
}
fn default_min_volume_ratio() -> f64 {
    EpisodicPivotCriteria::default().min_volume_ratio
}
fn default_min_volume() -> u64 {
    MomentumCriteria::new(MomentumPeriod::OneMonth).min_volume
}
fn default_limit() -> usize {
    DEFAULT_SCAN_LIMIT
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Large gap-ups on heavy relative volume, largest gap first.
async fn scan_episodic_pivot(
    State(state): State<AppState>,
    Query(query): Query<EpisodicPivotQuery>,
) -> Result<Json<ApiResponse<ScanResult>>, AppError> {
    let criteria = EpisodicPivotCriteria {
        min_gap: query.min_gap,
        min_volume_ratio: query.min_volume_ratio,
    };
    let result = state
        .scanner
        .scan_episodic_pivot(&state.universe, criteria, query.limit)
        .await;

    Ok(Json(ApiResponse::success(result)))
}

async fn scan_momentum(
    State(state): State<AppState>,
    Path(period): Path<String>,
    Query(query): Query<MomentumQuery>,
) -> Result<Json<ApiResponse<ScanResult>>, AppError> {
    let period: MomentumPeriod = period.parse().map_err(scanner_err)?;
    let criteria = MomentumCriteria {
        period,
        min_momentum: query.min_momentum,
        min_volume: query.min_volume,
    };
    let result = state
        .scanner
        .scan_momentum(&state.universe, criteria, query.limit)
        .await;

    Ok(Json(ApiResponse::success(result)))
}

async fn scan_breakout_setup(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<ScanResult>>, AppError> {
    let result = state
        .scanner
        .scan_breakout_setup(
            &state.universe,
            BreakoutSetupCriteria::default(),
            query.limit.unwrap_or(DEFAULT_SCAN_LIMIT),
        )
        .await;

    Ok(Json(ApiResponse::success(result)))
}

/// Every rule set over one fetch of the universe.
async fn scan_all(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<AllScans>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_SCAN_ALL_LIMIT);
    let all = state.scanner.scan_all(&state.universe, limit).await;

    tracing::info!(
        "Scan all: ep={} 1m={} 3m={} 6m={} setup={}",
        all.ep.count,
        all.momentum_1m.count,
        all.momentum_3m.count,
        all.momentum_6m.count,
        all.qullamaggie_setup.count
    );

    Ok(Json(ApiResponse::success(all)))
}

async fn get_stock(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<Snapshot>>, AppError> {
    let snapshot = state
        .scanner
        .get_snapshot(&symbol.to_uppercase())
        .await
        .map_err(scanner_err)?;

    Ok(Json(ApiResponse::success(snapshot)))
}

async fn get_news(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<NewsArticle>>>, AppError> {
    let symbol = symbol.to_uppercase();
    let limit = query.limit.unwrap_or(DEFAULT_NEWS_LIMIT);
    let articles = state
        .scanner
        .news(&symbol, limit)
        .await
        .map_err(scanner_err)?;

    Ok(Json(ApiResponse::success(articles)))
}

pub fn scanner_routes() -> Router<AppState> {
    Router::new()
        .route("/api/scan/ep", get(scan_episodic_pivot))
        .route("/api/scan/momentum/:period", get(scan_momentum))
        .route("/api/scan/qullamaggie", get(scan_breakout_setup))
        .route("/api/scan/all", get(scan_all))
        .route("/api/stock/:symbol", get(get_stock))
        .route("/api/news/:symbol", get(get_news))
}
