//! Translation of service errors into HTTP responses.
//!
//! This is the only place where errors become status codes. Internal
//! failures (schema or kind mismatches, storage) answer with a generic body;
//! their full detail goes to the log.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

use crate::DecisionServiceError;

/// Why a request failed at the HTTP boundary.
#[derive(Debug)]
pub enum ApiFailure {
    Service(DecisionServiceError),
    /// The payload could not be decoded; `field` when the decoder named one
    Malformed {
        field: Option<String>,
        message: String,
    },
    BadRequest(String),
    NotFound(String),
    Timeout(Duration),
    Internal(String),
}

impl From<DecisionServiceError> for ApiFailure {
    fn from(e: DecisionServiceError) -> Self {
        ApiFailure::Service(e)
    }
}

impl From<crate::game::ValidationError> for ApiFailure {
    fn from(e: crate::game::ValidationError) -> Self {
        ApiFailure::Service(DecisionServiceError::Validation(e))
    }
}

/// JSON error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub message: String,
}

impl ErrorBody {
    fn new(error: &'static str, message: impl Into<String>) -> Self {
        Self {
            error,
            status: None,
            field: None,
            model: None,
            message: message.into(),
        }
    }
}

const INTERNAL_MESSAGE: &str = "the decision model could not be applied";

impl ApiFailure {
    /// Label used in metrics and the request ledger
    pub fn kind(&self) -> &'static str {
        match self {
            ApiFailure::Service(e) => e.kind(),
            ApiFailure::Malformed { .. } => "validation_error",
            ApiFailure::BadRequest(_) => "bad_request",
            ApiFailure::NotFound(_) => "not_found",
            ApiFailure::Timeout(_) => "timeout",
            ApiFailure::Internal(_) => "internal_error",
        }
    }

    /// Build a failure from a serde decoding message such as ``missing field `down` ``.
    pub fn malformed(message: impl Into<String>) -> Self {
        let message = message.into();
        ApiFailure::Malformed {
            field: field_in_message(&message),
            message,
        }
    }

    /// Status code and public body; logs what the body hides.
    pub fn to_parts(&self, trace_id: &str) -> (StatusCode, ErrorBody) {
        match self {
            ApiFailure::Service(e) => service_parts(e, trace_id),
            ApiFailure::Malformed { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    field: field.clone(),
                    ..ErrorBody::new("validation_error", message.clone())
                },
            ),
            ApiFailure::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, ErrorBody::new("bad_request", message.clone()))
            }
            ApiFailure::NotFound(message) => {
                (StatusCode::NOT_FOUND, ErrorBody::new("not_found", message.clone()))
            }
            ApiFailure::Timeout(budget) => {
                log::warn!("⏱️ [{}] decision exceeded its {:?} budget", trace_id, budget);
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    ErrorBody::new(
                        "timeout",
                        format!("no decision within {} ms", budget.as_millis()),
                    ),
                )
            }
            ApiFailure::Internal(detail) => {
                log::error!("❌ [{}] internal error: {}", trace_id, detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("internal_error", "internal error"),
                )
            }
        }
    }
}

fn service_parts(e: &DecisionServiceError, trace_id: &str) -> (StatusCode, ErrorBody) {
    match e {
        DecisionServiceError::Validation(v) => (
            StatusCode::BAD_REQUEST,
            ErrorBody {
                field: Some(v.field.to_string()),
                ..ErrorBody::new("validation_error", v.to_string())
            },
        ),
        DecisionServiceError::ModelUnavailable { model } => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorBody {
                status: Some("not_ready"),
                model: Some(model.clone()),
                ..ErrorBody::new("model_not_ready", format!("no active model for {}", model))
            },
        ),
        DecisionServiceError::NoPriorVersion { model } => (
            StatusCode::CONFLICT,
            ErrorBody {
                model: Some(model.clone()),
                ..ErrorBody::new("no_prior_version", e.to_string())
            },
        ),
        DecisionServiceError::VersionConflict { model, .. } => (
            StatusCode::CONFLICT,
            ErrorBody {
                model: Some(model.clone()),
                ..ErrorBody::new("version_conflict", e.to_string())
            },
        ),
        DecisionServiceError::InvalidConfig(message) => {
            (StatusCode::BAD_REQUEST, ErrorBody::new("bad_request", message.clone()))
        }
        DecisionServiceError::SchemaMismatch { .. } | DecisionServiceError::ModelKindMismatch { .. } => {
            log::error!("❌ [{}] {}: {}", trace_id, e.kind(), e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("internal_error", INTERNAL_MESSAGE),
            )
        }
        other => {
            log::error!("❌ [{}] {}: {}", trace_id, other.kind(), other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("internal_error", "internal error"),
            )
        }
    }
}

/// First back-quoted identifier in a serde message.
fn field_in_message(message: &str) -> Option<String> {
    let start = message.find('`')? + 1;
    let len = message[start..].find('`')?;
    let field = &message[start..start + len];
    if !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(field.to_string())
    } else {
        None
    }
}

/// Error response tagged with the request's trace id.
pub struct ApiError {
    pub trace_id: String,
    pub failure: ApiFailure,
}

#[derive(Serialize)]
struct TracedErrorBody {
    trace_id: String,
    #[serde(flatten)]
    body: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.failure.to_parts(&self.trace_id);
        (
            status,
            Json(TracedErrorBody {
                trace_id: self.trace_id,
                body,
            }),
        )
            .into_response()
    }
}
