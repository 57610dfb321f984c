//! Operator session and scan intake endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use linetrace_common::intake::{Advisory, ScanOutcome};
use linetrace_common::model::TraceabilityRecord;
use linetrace_common::ProductType;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::ApiError;
use crate::sessions::SessionSnapshot;
use crate::AppState;

/// Body of POST /api/sessions
#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    /// Falls back to the configured default operator
    pub operator: Option<String>,
    pub product_type: ProductType,
}

/// Body of PUT /api/sessions/:id/product-type
#[derive(Debug, Deserialize)]
pub struct ProductTypeRequest {
    pub product_type: ProductType,
}

/// Body of POST /api/sessions/:id/scan
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// One complete scanner read
    pub code: String,
}

/// Result of one scan
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub outcome: &'static str,
    /// Present when the scan wrote a record
    pub record: Option<TraceabilityRecord>,
    /// Advisory raised by this scan; returned once, then cleared
    pub advisory: Option<Advisory>,
    pub session: SessionSnapshot,
}

fn outcome_name(outcome: &ScanOutcome) -> &'static str {
    match outcome {
        ScanOutcome::Ignored => "ignored",
        ScanOutcome::SerialPending(_) => "serial_pending",
        ScanOutcome::SerialRequired => "serial_required",
        ScanOutcome::Recorded(_) => "recorded",
        ScanOutcome::Duplicate(_) => "duplicate",
        ScanOutcome::StoreFailed(_) => "store_failed",
    }
}

/// POST /api/sessions
pub async fn open_session(
    State(state): State<AppState>,
    Json(request): Json<OpenSessionRequest>,
) -> (StatusCode, Json<SessionSnapshot>) {
    let operator = request
        .operator
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .unwrap_or_else(|| state.config.default_operator.clone());

    let (id, session) = state
        .sessions
        .open(operator.clone(), request.product_type, state.clock.now());
    info!("Opened session {} for {} ({})", id, operator, request.product_type);

    let scan = session.scan.lock().await;
    (
        StatusCode::CREATED,
        Json(SessionSnapshot::capture(id, &scan, &session.gate)),
    )
}

/// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state
        .sessions
        .get(&id, state.clock.now())
        .ok_or_else(|| ApiError::session_not_found(id))?;

    let scan = session.scan.lock().await;
    Ok(Json(SessionSnapshot::capture(id, &scan, &session.gate)))
}

/// DELETE /api/sessions/:id
pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.sessions.close(&id) {
        return Err(ApiError::session_not_found(id));
    }
    info!("Closed session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/sessions/:id/product-type
///
/// Applies to the next recorded unit; a pending serial is kept.
pub async fn set_product_type(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ProductTypeRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state
        .sessions
        .get(&id, state.clock.now())
        .ok_or_else(|| ApiError::session_not_found(id))?;

    let mut scan = session.scan.lock().await;
    scan.set_product_type(request.product_type);
    Ok(Json(SessionSnapshot::capture(id, &scan, &session.gate)))
}

/// POST /api/sessions/:id/scan
///
/// Always answers 200 for a known session: duplicates and store failures are
/// operator advisories, not request errors.
pub async fn scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, ApiError> {
    let session = state
        .sessions
        .get(&id, state.clock.now())
        .ok_or_else(|| ApiError::session_not_found(id))?;

    let mut scan = session.scan.lock().await;
    let outcome = state
        .intake
        .handle_scan(&mut scan, &request.code, state.clock.as_ref())
        .await;

    let advisory = scan.take_advisory();
    let snapshot = SessionSnapshot::capture(id, &scan, &session.gate);
    let outcome_label = outcome_name(&outcome);
    let record = match outcome {
        ScanOutcome::Recorded(record) => Some(record),
        _ => None,
    };

    Ok(Json(ScanResponse {
        outcome: outcome_label,
        record,
        advisory,
        session: snapshot,
    }))
}
