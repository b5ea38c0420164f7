use axum::{extract::State, response::Response, Json};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::middleware::{AdminUser, AuthUser};
use crate::services::{self, Broadcast};
use crate::state::AppState;
use crate::utils::response::{empty_success, success};
use crate::utils::AppError;

#[derive(Deserialize)]
pub struct RegisterTokenRequest {
    pub expo_push_token: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UnregisterTokenRequest {
    pub expo_push_token: String,
}

#[derive(Deserialize)]
pub struct SendNotificationRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub user_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub send_to_all: bool,
}

/// POST /push-tokens
pub async fn register_push_token(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<RegisterTokenRequest>,
) -> Result<Response, AppError> {
    services::register_push_token(
        state.store.as_ref(),
        user.id,
        &body.expo_push_token,
        body.device_id.as_deref(),
    )
    .await?;

    Ok(empty_success("Push token registered"))
}

/// DELETE /push-tokens
pub async fn unregister_push_token(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<UnregisterTokenRequest>,
) -> Result<Response, AppError> {
    let removed = state
        .store
        .remove_push_token(user.id, body.expo_push_token.trim())
        .await?;
    if !removed {
        return Err(AppError::NotFound("Push token not registered".to_string()));
    }

    Ok(empty_success("Push token removed"))
}

/// POST /admin/notifications
pub async fn send_notification(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(body): Json<SendNotificationRequest>,
) -> Result<Response, AppError> {
    tracing::info!(admin_id = %admin.user.id, "Broadcast requested");

    let report = services::broadcast(
        state.store.as_ref(),
        state.push_relay.as_ref(),
        Broadcast {
            title: body.title,
            body: body.body,
            data: body.data,
            user_ids: body.user_ids,
            send_to_all: body.send_to_all,
        },
    )
    .await?;

    Ok(success(report, "Notifications sent"))
}
