//! Error taxonomy shared by the realtime channel and the REST collaborators.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Error, Debug)]
pub enum ChatError {
    /// Missing, malformed, or expired credential.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Authenticated, but the role does not allow the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Bad input from the acting sender. Never broadcast.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Store read/write failure. Aborts before any fan-out.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ChatError::Persistence(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        ChatError::Persistence(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ChatError {
    fn from(err: tokio::task::JoinError) -> Self {
        ChatError::Persistence(format!("blocking task failed: {}", err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for ChatError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ChatError::Persistence(format!("DB lock error: {}", err))
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        if let ChatError::Persistence(detail) = &self {
            tracing::error!(error = %detail, "Request failed on persistence");
        }
        let body = json!({
            "success": false,
            "message": self.public_message(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ChatError::Authentication("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ChatError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ChatError::NotFound("Receiver".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_persistence_detail_is_hidden() {
        let err = ChatError::Persistence("disk I/O error at /var/lib".into());
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(
            ChatError::NotFound("Receiver".into()).public_message(),
            "Receiver not found"
        );
    }
}
