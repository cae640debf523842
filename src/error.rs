use axum::http::header::{HeaderValue, RETRY_AFTER, WWW_AUTHENTICATE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Failure reported by an identity or permission collaborator.
///
/// Distinct from "not found": a lookup that finds nothing returns `Ok(None)`
/// (or an empty permission set), never a `StoreError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    Query(String),
}

/// Every way a request can be terminated by the middleware pipeline.
///
/// Each variant maps to exactly one HTTP status. Client-caused variants are
/// 4xx and are only logged at debug level; server-internal variants are 500
/// and are logged as errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("user account is not activated")]
    InactiveAccount,

    #[error("missing permission: {0}")]
    NotPermitted(String),

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("client address unavailable on request")]
    MissingClientAddress,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: &'static str,
}

const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidAuthenticationToken | AppError::AuthenticationRequired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::InactiveAccount | AppError::NotPermitted(_) => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::MissingClientAddress
            | AppError::Store(_)
            | AppError::Internal(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind_and_message(&self) -> (&'static str, &'static str) {
        match self {
            AppError::InvalidAuthenticationToken => (
                "invalid_authentication_token",
                "invalid or missing authentication token",
            ),
            AppError::AuthenticationRequired => (
                "authentication_required",
                "you must be authenticated to access this resource",
            ),
            AppError::InactiveAccount => (
                "inactive_account",
                "your user account must be activated to access this resource",
            ),
            AppError::NotPermitted(_) => (
                "not_permitted",
                "your user account doesn't have the necessary permissions to access this resource",
            ),
            AppError::RateLimited { .. } => ("rate_limit_exceeded", "rate limit exceeded"),
            // Never expose internal details to clients
            AppError::MissingClientAddress
            | AppError::Store(_)
            | AppError::Internal(_)
            | AppError::ConfigError(_) => ("internal_error", SERVER_ERROR_MESSAGE),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let (error, message) = self.kind_and_message();
        let mut response = (status, axum::Json(ErrorResponse { error, message })).into_response();

        match self {
            AppError::InvalidAuthenticationToken => {
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            AppError::RateLimited { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
            }
            _ => {}
        }

        response
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
