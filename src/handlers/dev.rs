use axum::extract::State;
use serde_json::{Value, json};

use crate::middleware::auth::DevOnly;
use crate::router::LedgerState;
use crate::service::report_cache::CacheAnalysis;
use crate::types::envelope::ApiResponse;

/// GET /api/dev/cache-analysis -> report cache statistics, development only.
pub async fn cache_analysis(_dev: DevOnly, State(state): State<LedgerState>) -> ApiResponse<CacheAnalysis> {
    ApiResponse::ok(state.cache.analysis())
}

pub async fn health() -> ApiResponse<Value> {
    ApiResponse::ok(json!({ "status": "ok" }))
}
