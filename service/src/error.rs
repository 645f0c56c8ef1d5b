use abi::{ErrorKind, ParkingError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// Everything a handler can fail with. Core errors pass through with their
/// kind, the rest come from the HTTP boundary itself.
#[derive(Debug)]
pub enum ApiError {
    Parking(ParkingError),
    /// identity headers missing or unreadable
    Unauthorized(String),
    /// request body or parameters could not be decoded
    BadRequest(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl From<ParkingError> for ApiError {
    fn from(e: ParkingError) -> Self {
        Self::Parking(e)
    }
}

fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::InvalidStateTransition
        | ErrorKind::CapacityExhausted
        | ErrorKind::Conflict
        | ErrorKind::ConcurrencyConflict => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Parking(e) => {
                let kind = e.kind();
                let message = if kind == ErrorKind::Internal {
                    error!(error = %e, "request failed");
                    "internal error".to_string()
                } else {
                    e.to_string()
                };
                (
                    status_of(kind),
                    ErrorBody {
                        kind: kind.to_string(),
                        message,
                    },
                )
            }
            ApiError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    kind: "unauthorized".to_string(),
                    message,
                },
            ),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    kind: ErrorKind::ValidationError.to_string(),
                    message,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}
