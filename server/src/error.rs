//! HTTP error mapping.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use ofistur_common::{ErrorKind, LedgerError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Error body: `{ "error": { "code", "message", "field" } }`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Errors a handler can return.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Request could not be decoded (body, path or query string).
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Ledger(err) => match err.kind() {
                ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
                ErrorKind::Authorization => StatusCode::FORBIDDEN,
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn detail(&self) -> ErrorDetail {
        match self {
            ApiError::Ledger(err) => ErrorDetail {
                code: err.error_code(),
                message: match err.kind() {
                    ErrorKind::Internal => "internal error".to_string(),
                    _ => err.to_string(),
                },
                field: err.field().map(str::to_string),
            },
            ApiError::BadRequest(message) => ErrorDetail {
                code: "BAD_REQUEST",
                message: message.clone(),
                field: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        }
        (status, Json(ErrorResponse { error: self.detail() })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ofistur_common::AccountId;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (LedgerError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (LedgerError::forbidden("x"), StatusCode::FORBIDDEN),
            (LedgerError::validation("x", "amount"), StatusCode::BAD_REQUEST),
            (LedgerError::AccountNotFound(AccountId::new()), StatusCode::NOT_FOUND),
            (LedgerError::conflict("x"), StatusCode::CONFLICT),
            (LedgerError::StorageConflict("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (LedgerError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let detail = ApiError::from(LedgerError::Database("password=secret".into())).detail();
        assert_eq!(detail.code, "DATABASE_ERROR");
        assert_eq!(detail.message, "internal error");

        let detail = ApiError::from(LedgerError::validation("bad amount", "amount")).detail();
        assert_eq!(detail.field.as_deref(), Some("amount"));
    }
}
