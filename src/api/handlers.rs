use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::RequestId,
    models::{ItemId, ItemStats, PurchasePath, RecommendationResult, ScoringPolicy},
    services::{render_csv, StatsAnalyzer},
};

use super::AppState;

const DEFAULT_MAX_PATH_LENGTH: usize = 3;
const DEFAULT_MIN_SUPPORT: u32 = 1;
const DEFAULT_REPORT_SIZE: usize = 5;

// Request types

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub item_ids: Vec<ItemId>,
    pub num_recommendations: Option<usize>,
    pub policy: Option<ScoringPolicy>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PathsQuery {
    pub max_path_length: Option<usize>,
    pub min_support: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ItemStatsRequest {
    pub item_ids: Vec<ItemId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub count: Option<usize>,
}

// Handlers

/// Health check endpoint, reporting whether the event store answers
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "healthy" }))),
        Err(e) => {
            tracing::error!(store = state.store.name(), error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "error": e.to_string() })),
            )
        }
    }
}

/// Recommendations for a basket of seed items
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResult>> {
    let num_recommendations = request
        .num_recommendations
        .unwrap_or(state.default_num_recommendations);
    let policy = request.policy.unwrap_or(state.settings.default_policy);

    tracing::debug!(
        %request_id,
        item_count = request.item_ids.len(),
        num_recommendations,
        "Recommendation request"
    );

    let deadline = state.deadline();
    let result = state
        .recommender(&deadline)
        .recommend(&request.item_ids, num_recommendations, policy)
        .await?;

    if result.partial {
        tracing::warn!(
            %request_id,
            failed_signals = ?result.failed_signals,
            "Partial recommendation result"
        );
    }

    Ok(Json(result))
}

/// Frequent view sequences leading from an item to a purchase
pub async fn purchase_paths(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(item_id): Path<ItemId>,
    Query(query): Query<PathsQuery>,
) -> AppResult<Json<Vec<PurchasePath>>> {
    let max_path_length = query.max_path_length.unwrap_or(DEFAULT_MAX_PATH_LENGTH);
    let min_support = query.min_support.unwrap_or(DEFAULT_MIN_SUPPORT);

    tracing::debug!(%request_id, item_id, max_path_length, min_support, "Path mining request");

    let deadline = state.deadline();
    let paths = state
        .recommender(&deadline)
        .mine_paths(item_id, max_path_length, min_support)
        .await?;

    Ok(Json(paths))
}

/// Interaction statistics for the requested items
pub async fn item_stats(
    State(state): State<AppState>,
    Json(request): Json<ItemStatsRequest>,
) -> AppResult<Json<Vec<ItemStats>>> {
    let deadline = state.deadline();
    let recommender = state.recommender(&deadline);
    let stats = StatsAnalyzer::new(&recommender)
        .item_stats(&request.item_ids)
        .await?;

    Ok(Json(stats))
}

/// Statistics for a random sample of items, as JSON or as CSV when the client accepts it
pub async fn report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ReportQuery>,
) -> AppResult<Response> {
    let deadline = state.deadline();
    let recommender = state.recommender(&deadline);
    let report = StatsAnalyzer::new(&recommender)
        .report(query.count.unwrap_or(DEFAULT_REPORT_SIZE))
        .await?;

    if accepts_csv(&headers) {
        let body = render_csv(&report)?;
        return Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body).into_response());
    }

    Ok(Json(report).into_response())
}

fn accepts_csv(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("text/csv"))
}
