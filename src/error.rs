use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{auth::AuthError, repository::StoreError};

/// ErrorResponse
///
/// The standard failure envelope, e.g.
/// `{"success": false, "error": 404, "message": "resource not found"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: u16,
    pub message: String,
}

/// ApiError
///
/// Every way a request can fail. The `Display` text of the plain variants is the
/// envelope message sent to the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request")]
    BadRequest,
    #[error("authorization failed")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("resource not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("unprocessable")]
    Unprocessable,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(e) => e.status,
        }
    }
}

/// envelope
///
/// Builds a standard failure response.
pub fn envelope(status: StatusCode, message: &str) -> Response {
    let body = ErrorResponse {
        success: false,
        error: status.as_u16(),
        message: message.to_string(),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            // Verifier failures keep their own code/description body.
            ApiError::Auth(e) => e.into_response(),
            ApiError::Store(e) => {
                tracing::error!(error = %e, "persistence failure");
                envelope(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
            other => envelope(other.status(), &other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    /// A body that is not JSON is a bad request; JSON of the wrong shape is unprocessable.
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "rejected request body");
        match rejection {
            JsonRejection::JsonDataError(_) => ApiError::Unprocessable,
            _ => ApiError::BadRequest,
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(error = %rejection, "rejected path parameters");
        ApiError::NotFound
    }
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;
