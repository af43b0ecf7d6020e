use crate::middleware::error_handling;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_handling::into_response(self).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Errors reported on the socket as `chat-error`.
///
/// None of these close the connection; they are sent to the originating
/// connection only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),

    #[error("cannot start a private chat with yourself")]
    SelfConversationNotAllowed,

    #[error("message text cannot be empty")]
    EmptyMessage,

    #[error("missing required fields: {0}")]
    MissingFields(String),
}

impl ChatError {
    /// Wire name carried in the `error` field of `chat-error`.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "ValidationError",
            ChatError::SelfConversationNotAllowed => "SelfConversationNotAllowed",
            ChatError::EmptyMessage => "EmptyMessage",
            ChatError::MissingFields(_) => "MissingFields",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ChatError::Validation(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// Returns whether a client may reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(e) => {
                matches!(
                    e,
                    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
                )
            }
            AppError::Redis(e) => e.is_io_error() || e.is_timeout(),
            AppError::Internal => true,
            _ => false,
        }
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) | AppError::Chat(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound => 404,
            AppError::Database(_) | AppError::Redis(_) if self.is_retryable() => 503,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_error_kinds_match_wire_names() {
        assert_eq!(ChatError::validation("bad").kind(), "ValidationError");
        assert_eq!(
            ChatError::SelfConversationNotAllowed.kind(),
            "SelfConversationNotAllowed"
        );
        assert_eq!(ChatError::EmptyMessage.kind(), "EmptyMessage");
        assert_eq!(
            ChatError::MissingFields("roomId".into()).kind(),
            "MissingFields"
        );
    }

    #[test]
    fn chat_errors_are_client_errors() {
        let err: AppError = ChatError::EmptyMessage.into();
        assert_eq!(err.status_code(), 400);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "message text cannot be empty");
    }

    #[test]
    fn pool_timeouts_are_retryable() {
        let err = AppError::Database(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 503);

        let err = AppError::Database(sqlx::Error::RowNotFound);
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), 500);
    }
}
