/// Unified error types for the gadget API
use crate::response::Envelope;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Main error type for the API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Database errors that could not be translated into a domain error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Request or input validation errors
    #[error("{0}")]
    Validation(String),

    /// Missing, malformed or expired credentials
    #[error("{0}")]
    Authentication(String),

    /// Authenticated caller lacks the required role
    #[error("{0}")]
    Authorization(String),

    /// Not found errors
    #[error("{0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate username or codename)
    #[error("{0}")]
    Conflict(String),

    /// Operation not permitted in the gadget's current status
    #[error("{0}")]
    InvalidState(String),

    /// Self-destruct confirmation code did not match an unused code
    #[error("{0}")]
    InvalidCode(String),

    /// Codename allocation ran out of attempts
    #[error("Codename generation exhausted after {attempts} attempts")]
    GenerationExhausted { attempts: u32 },

    /// Rate limiting errors
    #[error("Too many requests, please try again later.")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// JWT issuance errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidState(_) | ApiError::InvalidCode(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::GenerationExhausted { .. }
            | ApiError::Database(_)
            | ApiError::Jwt(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Storage-layer errors are translated here so that constraint codes never
/// reach the caller.
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                ApiError::Conflict(format!("Duplicate entry: {}", db_err.message()))
            }
            other => ApiError::Database(other),
        }
    }
}

/// Convert ApiError to an enveloped HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = match &self {
            ApiError::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        };

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed with internal error");
            "Internal server error".to_string() // Don't leak details
        } else {
            self.to_string()
        };

        let mut response = (status, Json(Envelope::<()>::error(status, message))).into_response();

        if let Some(wait) = retry_after {
            // Whole seconds, rounded up
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }

        response
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
