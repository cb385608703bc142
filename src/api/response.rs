use crate::idempotency::IdempotencyConflict;
use crate::room::RoomError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

/// Success envelope: `{"status": "ok", "data": ...}`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    status: &'static str,
    data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { status: "ok", data })
}

#[derive(Serialize)]
struct ErrorEnvelope {
    status: &'static str,
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    retryable: bool,
}

/// Command errors as seen by clients
#[derive(Debug)]
pub enum AppError {
    /// Room or entity absent; re-register or re-observe
    NotFound(String),
    /// Transaction id reused with a different payload
    Conflict(String),
    InvalidInput(String),
    Internal(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, bool) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", false),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT", false),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", false),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", true),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, retryable) = self.parts();
        let message = match self {
            AppError::Internal(msg) => {
                error!(error = %msg, "Internal error handling command");
                "internal error".to_string()
            }
            AppError::NotFound(msg) | AppError::Conflict(msg) | AppError::InvalidInput(msg) => {
                msg
            }
        };

        let body = Json(ErrorEnvelope {
            status: "error",
            error: ErrorBody {
                code,
                message,
                retryable,
            },
        });
        (status, body).into_response()
    }
}

impl From<RoomError> for AppError {
    fn from(e: RoomError) -> Self {
        match e {
            RoomError::NotFound(_) | RoomError::RoomNotFound(_) => AppError::NotFound(e.to_string()),
            RoomError::InvalidInput(msg) => AppError::InvalidInput(msg),
            RoomError::RoomAlreadyExists(_) => AppError::Conflict(e.to_string()),
            RoomError::InvalidMap(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<IdempotencyConflict> for AppError {
    fn from(e: IdempotencyConflict) -> Self {
        AppError::Conflict(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

/// Deserialize a request body, reporting failures as invalid input
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::InvalidInput(e.to_string()))
}
