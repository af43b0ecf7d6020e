use axum::{
    extract::{Path, State},
    Json,
};
use error_types::ApiResponse;
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::{ContactSummary, UserId};
use crate::state::AppState;

pub async fn list_contacts(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<ApiResponse<Vec<ContactSummary>>>> {
    Ok(Json(ApiResponse::ok(state.messages.contacts(&user).await?)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatus {
    pub user_id: UserId,
    pub is_online: bool,
}

pub async fn user_online(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<OnlineStatus>>> {
    let user = UserId::parse(&user_id)?;
    let is_online = state.messages.is_online(&user).await;
    Ok(Json(ApiResponse::ok(OnlineStatus {
        user_id: user,
        is_online,
    })))
}
