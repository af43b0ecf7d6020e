//! Wire shapes shared by every REST surface of the chat backend.
//!
//! Successful calls answer `{"success": true, "data": ...}`; failures answer
//! an [`ErrorResponse`] whose `success` is always `false`. Clients treat any
//! `success: false` body as a transient failure and keep their optimistic state.

use serde::{Deserialize, Serialize};

/// Success envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Failure envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,

    /// Human readable explanation
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Coarse category, one of [`error_types`]
    pub error_type: String,

    /// Stable machine code, one of [`error_codes`]
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// RFC 3339
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            details: None,
            trace_id: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

pub mod error_codes {
    // Authentication
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";

    // Private messaging
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const SELF_CONVERSATION: &str = "SELF_CONVERSATION_NOT_ALLOWED";
    pub const EMPTY_MESSAGE: &str = "EMPTY_MESSAGE";
    pub const MISSING_FIELDS: &str = "MISSING_FIELDS";
    pub const NOT_ROOM_PARTICIPANT: &str = "NOT_ROOM_PARTICIPANT";
    pub const NOT_FOUND: &str = "NOT_FOUND";

    // Database/System
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
}

pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const SERVER_ERROR: &str = "server_error";
    pub const SERVICE_UNAVAILABLE_ERROR: &str = "service_unavailable_error";
}
