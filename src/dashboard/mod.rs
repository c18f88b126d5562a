use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::db::{BacktestStore, Database};
use crate::settlement::{performance_report, settle_pending, SettlementConfig, SettlementRun};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub settlement: SettlementConfig,
}

/// Build the Axum router for the JSON API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/performance", get(performance_handler))
        .route("/api/backtests", get(backtests_handler))
        .route("/api/recommendations/:id", get(recommendation_handler))
        .route("/api/settle", post(settle_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

type ApiError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> ApiError {
    error!("API error: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[derive(Debug, Deserialize)]
struct PerformanceQuery {
    days: Option<i64>,
}

/// GET /api/performance?days=30
async fn performance_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PerformanceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let days = q.days.unwrap_or(30);
    if days < 0 {
        return Err((StatusCode::BAD_REQUEST, "days must not be negative".into()));
    }
    performance_report(&state.db, days, Utc::now())
        .map(Json)
        .map_err(internal)
}

/// GET /api/backtests
async fn backtests_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    state.db.list_backtests(50).map(Json).map_err(internal)
}

/// GET /api/recommendations/:id
async fn recommendation_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.db.get_recommendation(id).map_err(internal)? {
        Some((recommendation, settlement)) => Ok(Json(serde_json::json!({
            "recommendation": recommendation,
            "settlement": settlement,
        }))),
        None => Err((StatusCode::NOT_FOUND, format!("recommendation {id} not found"))),
    }
}

/// POST /api/settle. 409 when another run holds the settlement lock.
async fn settle_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let run = run_settlement(state.db.clone(), state.settlement.clone())
        .await
        .map_err(internal)?;
    let status = match run {
        SettlementRun::Completed(_) => StatusCode::OK,
        SettlementRun::Busy { .. } => StatusCode::CONFLICT,
    };
    Ok((status, Json(run)))
}

/// Settlement is synchronous and may wait on the lock, so it runs on the
/// blocking pool.
pub async fn run_settlement(db: Database, config: SettlementConfig) -> anyhow::Result<SettlementRun> {
    let today = Utc::now().date_naive();
    let run = tokio::task::spawn_blocking(move || settle_pending(&db, &config, today)).await??;
    Ok(run)
}
