use axum::{http::StatusCode, response::IntoResponse, Json};
use error_types::{error_codes, error_types as kinds, ErrorResponse};

use crate::error::{AppError, ChatError};

/// Map a service error onto the shared failure envelope.
///
/// Server-side failures are logged here and answered with a generic
/// message so driver details never reach clients.
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::BadRequest(_) => (kinds::VALIDATION_ERROR, error_codes::INVALID_REQUEST),
        AppError::Chat(chat) => (
            kinds::VALIDATION_ERROR,
            match chat {
                ChatError::Validation(_) => error_codes::VALIDATION_FAILED,
                ChatError::SelfConversationNotAllowed => error_codes::SELF_CONVERSATION,
                ChatError::EmptyMessage => error_codes::EMPTY_MESSAGE,
                ChatError::MissingFields(_) => error_codes::MISSING_FIELDS,
            },
        ),
        AppError::Unauthorized => (kinds::AUTHENTICATION_ERROR, error_codes::TOKEN_INVALID),
        AppError::Forbidden(_) => (kinds::AUTHORIZATION_ERROR, error_codes::NOT_ROOM_PARTICIPANT),
        AppError::NotFound => (kinds::NOT_FOUND_ERROR, error_codes::NOT_FOUND),
        AppError::Database(_) | AppError::Redis(_) if err.is_retryable() => (
            kinds::SERVICE_UNAVAILABLE_ERROR,
            error_codes::SERVICE_UNAVAILABLE,
        ),
        AppError::Database(_) => (kinds::SERVER_ERROR, error_codes::DATABASE_ERROR),
        AppError::Redis(_)
        | AppError::Config(_)
        | AppError::StartServer(_)
        | AppError::Internal => (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR),
    };

    let message = if status.is_server_error() {
        tracing::error!(error = %err, status = status.as_u16(), "request failed");
        status
            .canonical_reason()
            .unwrap_or("Internal Server Error")
            .to_string()
    } else {
        err.to_string()
    };

    (
        status,
        ErrorResponse::new(&message, status.as_u16(), error_type, code),
    )
}

pub fn into_response(err: AppError) -> impl IntoResponse {
    let (status, response) = map_error(&err);
    (status, Json(response))
}
