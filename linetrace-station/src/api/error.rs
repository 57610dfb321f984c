//! API error responses
//!
//! Every error renders as `{"error": message}` with a mapped status code.
//! Some variants add structured fields next to the message; a conflict also
//! carries an operator `advisory`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use linetrace_common::checklist::SubmitError;
use linetrace_common::intake::Advisory;
use linetrace_common::Error;
use serde_json::{json, Map, Value};
use tracing::error;

/// HTTP API errors
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    /// Submission failed validation; lists the offending item keys
    Unprocessable { message: String, missing: Vec<String> },
    /// Checklist rows partly persisted
    PartialSave { message: String, details: Value },
    Internal(String),
}

impl ApiError {
    pub fn session_not_found(id: impl std::fmt::Display) -> Self {
        ApiError::NotFound(format!("Session not found: {}", id))
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        let message = e.to_string();
        match e {
            SubmitError::InFlight | SubmitError::AlreadyCompleted { .. } => {
                ApiError::Conflict(message)
            }
            SubmitError::UnknownUnit { .. } => ApiError::NotFound(message),
            SubmitError::Lookup(_) => ApiError::Internal(message),
            SubmitError::Validation(v) => ApiError::Unprocessable {
                message,
                missing: v.missing,
            },
            SubmitError::Batch { saved, total, failures } => ApiError::PartialSave {
                message,
                details: json!({
                    "saved": saved,
                    "total": total,
                    "failures": failures,
                }),
            },
            SubmitError::Header(_) => ApiError::PartialSave {
                message,
                details: json!({ "header_written": false }),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut extra = Map::new();
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => {
                extra.insert("advisory".to_string(), json!(Advisory::warning(msg.clone())));
                (StatusCode::CONFLICT, msg)
            }
            ApiError::Unprocessable { message, missing } => {
                extra.insert("missing".to_string(), json!(missing));
                (StatusCode::UNPROCESSABLE_ENTITY, message)
            }
            ApiError::PartialSave { message, details } => {
                if let Value::Object(details) = details {
                    extra.extend(details);
                }
                error!("Checklist partly saved: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
            ApiError::Internal(msg) => {
                error!("Request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(message));
        body.extend(extra);

        (status, Json(Value::Object(body))).into_response()
    }
}
