//! Unified API error handling.
//!
//! Every handler error is converted at the boundary into a JSON `{message}`
//! body with an appropriate HTTP status. Unexpected failures are logged with
//! full detail server-side and surfaced to the client as a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Generic message for failures the client has no business inspecting.
pub const SERVER_ERROR_MESSAGE: &str = "Error en el servidor.";

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed or missing input (400)
    Validation,
    /// Duplicate resource, e.g. an already-registered email (400)
    Conflict,
    /// Role or admin gate-code mismatch (403 by default)
    Authorization,
    /// Password comparison failed (400)
    InvalidCredentials,
    /// Resource does not exist (404)
    NotFound,
    /// No credential presented (401)
    Unauthenticated,
    /// Token unknown, malformed or forged (400 by default)
    InvalidToken,
    /// Token past its expiry (400 by default)
    ExpiredToken,
    /// Wrong HTTP method for an endpoint that wants another one (405)
    MethodNotAllowed,
    /// Unexpected failure (500)
    Internal,
}

impl ErrorCode {
    /// Default HTTP status for this error code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => StatusCode::BAD_REQUEST,
            ErrorCode::Authorization => StatusCode::FORBIDDEN,
            ErrorCode::InvalidCredentials => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::InvalidToken => StatusCode::BAD_REQUEST,
            ErrorCode::ExpiredToken => StatusCode::BAD_REQUEST,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Unified API error type
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
        }
    }

    /// Override the HTTP status while keeping the error code. Used where
    /// the wire contract pins a status that differs from the code's
    /// default (e.g. login's 400 for an unknown user).
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    // -------------------------------------------------------------------------
    // Convenience constructors for common error types
    // -------------------------------------------------------------------------

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Authorization, message)
    }

    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidCredentials, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn expired_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExpiredToken, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MethodNotAllowed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);

        match &err {
            sqlx::Error::RowNotFound => ApiError::not_found("Recurso no encontrado."),
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("UNIQUE constraint failed") {
                    ApiError::conflict("El recurso ya existe.")
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    ApiError::validation("El recurso referenciado no existe.")
                } else {
                    ApiError::internal(SERVER_ERROR_MESSAGE)
                }
            }
            _ => ApiError::internal(SERVER_ERROR_MESSAGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_codes() {
        assert_eq!(ErrorCode::Validation.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Conflict.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Authorization.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ErrorCode::ExpiredToken.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_api_error_creation() {
        let err = ApiError::not_found("Usuario no encontrado.");
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Usuario no encontrado.");
    }

    #[test]
    fn test_custom_status_code() {
        let err =
            ApiError::not_found("Usuario no encontrado.").with_status(StatusCode::BAD_REQUEST);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
