//! Dashboard listing

use axum::{
    extract::{Query, State},
    Json,
};
use linetrace_common::model::TraceabilityRecord;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::AppState;

/// Query parameters for the dashboard
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    /// Row cap; defaults to and may not exceed the configured dashboard limit
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RecentResponse {
    pub limit: i64,
    pub records: Vec<TraceabilityRecord>,
}

/// GET /api/records/recent
///
/// Newest first, capped. Not suitable for completeness checks.
pub async fn recent_records(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<RecentResponse>, ApiError> {
    let cap = state.config.dashboard_limit;
    let limit = query.limit.unwrap_or(cap).min(cap);
    let records = state.records.list_recent(limit).await?;

    Ok(Json(RecentResponse { limit, records }))
}
