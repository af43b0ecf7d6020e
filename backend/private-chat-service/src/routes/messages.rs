use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use error_types::ApiResponse;
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, ChatError};
use crate::middleware::auth::AuthUser;
use crate::models::{Message, MessageId, UserId};
use crate::repository::AppendOutcome;
use crate::room::RoomId;
use crate::services::message_service::NewMessage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendMessageRequest {
    pub message_id: Option<String>,
    pub recipient_id: Option<String>,
    pub room_id: Option<String>,
    #[serde(alias = "message")]
    pub text: Option<String>,
}

impl AppendMessageRequest {
    fn into_new_message(self) -> Result<NewMessage, ChatError> {
        let mut missing = Vec::new();
        if self.recipient_id.is_none() {
            missing.push("recipientId");
        }
        if self.text.is_none() {
            missing.push("text");
        }
        let (Some(recipient), Some(text)) = (self.recipient_id, self.text) else {
            return Err(ChatError::MissingFields(missing.join(", ")));
        };
        Ok(NewMessage {
            message_id: self.message_id.as_deref().map(MessageId::parse).transpose()?,
            recipient_id: UserId::parse(&recipient)?,
            room_id: self.room_id.as_deref().map(RoomId::parse).transpose()?,
            text,
        })
    }
}

/// `POST /messages`: 201 on first append, 200 when the id was already stored.
pub async fn append_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<AppendMessageRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Message>>)> {
    let request = body.into_new_message()?;
    let (message, outcome) = state.messages.append(&user, request).await?;
    let status = match outcome {
        AppendOutcome::Inserted => StatusCode::CREATED,
        AppendOutcome::Duplicate => StatusCode::OK,
    };
    Ok((status, Json(ApiResponse::ok(message))))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn room_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<ApiResponse<Vec<Message>>>> {
    let room = RoomId::parse(&room_id)?;
    let messages = state
        .messages
        .history(&user, &room, query.limit, query.offset)
        .await?;
    Ok(Json(ApiResponse::ok(messages)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub room_id: Option<String>,
    pub message_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedCount {
    pub updated: u64,
}

/// `PUT /messages/mark-read`: flip listed messages addressed to the caller.
pub async fn mark_messages_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<MarkReadRequest>,
) -> AppResult<Json<ApiResponse<UpdatedCount>>> {
    let (Some(room_id), Some(ids)) = (body.room_id, body.message_ids) else {
        return Err(ChatError::MissingFields("roomId, messageIds".into()).into());
    };
    let room = RoomId::parse(&room_id)?;
    let ids = ids
        .iter()
        .map(|id| MessageId::parse(id))
        .collect::<Result<Vec<_>, _>>()?;

    let updated = state.messages.mark_read(&user, &room, &ids).await?;
    Ok(Json(ApiResponse::ok(UpdatedCount { updated })))
}
