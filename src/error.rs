/// Unified error types for Flock
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum FlockError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Record store could not serve a request (unsupported query, backend down)
    #[error("Record store error: {0}")]
    Store(String),

    /// A stored document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Referenced post does not exist
    #[error("Post not found: {0}")]
    PostNotFound(String),

    /// A post whose author account has vanished
    #[error("Author {author_id} of post {post_id} no longer exists")]
    AuthorNotFound { post_id: String, author_id: String },

    /// A retweet whose target post has vanished
    #[error("Retweet by {actor_id} points at missing post {post_id}")]
    TargetPostNotFound { actor_id: String, post_id: String },

    /// Conflict errors (e.g., duplicate edge)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),
}

impl FlockError {
    /// True for orphaned references, as opposed to ordinary not-found
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            FlockError::AuthorNotFound { .. } | FlockError::TargetPostNotFound { .. }
        )
    }

    /// Status, error name and numeric client code
    fn classify(&self) -> (StatusCode, &'static str, u32) {
        match self {
            FlockError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "AccountNotFound", 10601),
            FlockError::PostNotFound(_) => (StatusCode::NOT_FOUND, "PostNotFound", 10501),
            FlockError::AuthorNotFound { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "AuthorNotFound", 10901)
            }
            FlockError::TargetPostNotFound { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "TargetPostNotFound", 10902)
            }
            FlockError::Authentication(_) | FlockError::Jwt(_) => {
                (StatusCode::UNAUTHORIZED, "AuthenticationRequired", 10406)
            }
            FlockError::Authorization(_) => (StatusCode::FORBIDDEN, "Forbidden", 10502),
            FlockError::Validation(_) => (StatusCode::BAD_REQUEST, "InvalidRequest", 10400),
            FlockError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", 10409),
            FlockError::RateLimitExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, "RateLimitExceeded", 10429)
            }
            FlockError::Database(_)
            | FlockError::Store(_)
            | FlockError::Serialization(_)
            | FlockError::Internal(_)
            | FlockError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError", 0),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u32,
    pub message: String,
}

/// Convert FlockError to HTTP response
impl IntoResponse for FlockError {
    fn into_response(self) -> Response {
        let (status, error_code, code) = self.classify();

        if self.is_data_integrity() {
            tracing::error!(error = %self, "Data integrity violation");
        } else if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
        }

        let message = match self {
            // Don't leak details
            FlockError::Database(_)
            | FlockError::Store(_)
            | FlockError::Serialization(_)
            | FlockError::Internal(_)
            | FlockError::Io(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            code,
            message,
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for FlockError {
    fn from(errors: validator::ValidationErrors) -> Self {
        FlockError::Validation(errors.to_string())
    }
}

/// Result type alias for Flock operations
pub type FlockResult<T> = Result<T, FlockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_errors_are_distinct_from_not_found() {
        let orphan = FlockError::AuthorNotFound {
            post_id: "p1".to_string(),
            author_id: "ghost".to_string(),
        };
        assert!(orphan.is_data_integrity());
        assert!(!FlockError::PostNotFound("p1".to_string()).is_data_integrity());

        let (status, name, _) = orphan.classify();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(name, "AuthorNotFound");

        let (status, _, code) = FlockError::AccountNotFound("u1".to_string()).classify();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, 10601);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let response = FlockError::Store("disk on fire".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
