//! Checklist endpoints: pending queue, question template and submission

use axum::{
    extract::{Path, Query, State},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::NaiveDate;
use linetrace_common::checklist::{
    ChecklistSubmission, ChecklistTemplate, ItemResponse, PhotoUpload, SubmitReceipt,
};
use linetrace_common::model::PhotoOrigin;
use linetrace_common::pending::PendingUnit;
use linetrace_common::time::local_date;
use linetrace_common::{Code, ProductType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

use super::ApiError;
use crate::AppState;

/// Query parameters for the pending queue
#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub product_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    /// Local operating date the queue was computed for
    pub date: NaiveDate,
    pub units: Vec<PendingUnit>,
}

/// GET /api/checklist/pending
pub async fn pending_checklists(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<PendingResponse>, ApiError> {
    let filter = query
        .product_type
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(str::parse::<ProductType>)
        .transpose()?;

    let now = state.clock.now();
    let date = local_date(now, state.pending.timezone());
    let units = state.pending.pending(date, filter).await?;

    Ok(Json(PendingResponse { date, units }))
}

/// GET /api/checklist/template/:product_type
pub async fn checklist_template(
    Path(product_type): Path<String>,
) -> Result<Json<ChecklistTemplate>, ApiError> {
    let product_type: ProductType = product_type.parse()?;
    Ok(Json(ChecklistTemplate::for_product(product_type)))
}

/// Photo attached to a checklist submission
#[derive(Debug, Deserialize)]
pub struct PhotoPayload {
    pub origin: PhotoOrigin,
    pub mime_type: String,
    /// Base64 (standard alphabet) file contents
    pub data: String,
}

/// Body of POST /api/sessions/:id/checklist
#[derive(Debug, Deserialize)]
pub struct ChecklistRequest {
    pub serial: Code,
    pub product_type: ProductType,
    /// Informational; answers carry the order recorded at scan time
    #[serde(default)]
    pub order: Option<Code>,
    #[serde(default)]
    pub responses: BTreeMap<String, ItemResponse>,
    #[serde(default)]
    pub photos: Vec<PhotoPayload>,
}

fn decode_photos(photos: Vec<PhotoPayload>) -> Result<Vec<PhotoUpload>, ApiError> {
    photos
        .into_iter()
        .enumerate()
        .map(|(index, photo)| {
            let bytes = general_purpose::STANDARD
                .decode(photo.data.trim())
                .map_err(|e| ApiError::BadRequest(format!("Photo {} is not valid base64: {}", index + 1, e)))?;
            Ok(PhotoUpload {
                origin: photo.origin,
                mime_type: photo.mime_type,
                bytes,
            })
        })
        .collect()
}

/// POST /api/sessions/:id/checklist
///
/// Submitted with the session operator. The unit must have been scanned
/// under `product_type` (404 otherwise). A second submit while one is in
/// flight for the same session, or for a unit already inspected, is refused
/// with 409.
pub async fn submit_checklist(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChecklistRequest>,
) -> Result<Json<SubmitReceipt>, ApiError> {
    let session = state
        .sessions
        .get(&id, state.clock.now())
        .ok_or_else(|| ApiError::session_not_found(id))?;

    if request.serial.is_empty() {
        return Err(ApiError::BadRequest("Serial is required".to_string()));
    }

    let photos = decode_photos(request.photos)?;
    let submission = ChecklistSubmission {
        serial: request.serial,
        product_type: request.product_type,
        order: request.order.unwrap_or_default(),
        responses: request.responses,
    };

    let operator = session.scan.lock().await.operator().to_string();
    let receipt = state
        .checklist
        .submit(&session.gate, &submission, &operator, photos, state.clock.as_ref())
        .await?;

    for failure in &receipt.photo_errors {
        warn!("Evidence upload for serial {} failed: {}", submission.serial, failure);
    }

    Ok(Json(receipt))
}
