use axum::{
    extract::{Path, State},
    Json,
};
use error_types::ApiResponse;
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::{UnreadGroup, UserId};
use crate::routes::messages::UpdatedCount;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub unread_count: u64,
}

/// Unread messages grouped by sender, computed from the store on each call.
pub async fn unread_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<ApiResponse<Vec<UnreadGroup>>>> {
    Ok(Json(ApiResponse::ok(state.messages.unread(&user).await?)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<ApiResponse<UnreadCount>>> {
    let unread_count = state.messages.unread_count(&user).await?;
    Ok(Json(ApiResponse::ok(UnreadCount { unread_count })))
}

pub async fn mark_sender_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(sender_id): Path<String>,
) -> AppResult<Json<ApiResponse<UpdatedCount>>> {
    let sender = UserId::parse(&sender_id)?;
    let updated = state.messages.mark_sender_read(&user, &sender).await?;
    Ok(Json(ApiResponse::ok(UpdatedCount { updated })))
}
