use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::DeviceToken;
use crate::error::{AppError, AppResult, CoreError};
use crate::extractors::Actor;
use crate::notifications::{NoticeBroadcast, Notification};
use crate::preferences::NotificationPreferences;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct DeviceRequest {
    pub token: String,
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_platform() -> String {
    "unknown".to_string()
}

#[derive(Deserialize)]
pub struct NoticeRequest {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/{id}/read", post(mark_read))
        .route(
            "/notification-settings",
            get(get_settings).put(update_settings),
        )
        .route("/devices", post(register_device))
        .route("/notices", post(send_notice))
}

async fn list_notifications(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Notification>>> {
    let notifications = state
        .social
        .notifications(actor.as_str(), query.limit)
        .await?;
    Ok(Json(notifications))
}

async fn unread_count(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Value>> {
    let count = state.social.unread_count(actor.as_str()).await?;
    Ok(Json(json!({ "count": count })))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
    actor: Actor,
) -> AppResult<StatusCode> {
    if state.social.mark_read(actor.as_str(), &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

async fn mark_all_read(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Value>> {
    let updated = state.social.mark_all_read(actor.as_str()).await?;
    Ok(Json(json!({ "updated": updated })))
}

async fn get_settings(
    State(state): State<AppState>,
    actor: Actor,
) -> AppResult<Json<NotificationPreferences>> {
    Ok(Json(state.social.preferences(actor.as_str()).await?))
}

async fn update_settings(
    State(state): State<AppState>,
    actor: Actor,
    Json(prefs): Json<NotificationPreferences>,
) -> AppResult<Json<NotificationPreferences>> {
    let saved = state
        .social
        .update_preferences(actor.as_str(), &prefs)
        .await?;
    Ok(Json(saved))
}

async fn register_device(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<DeviceRequest>,
) -> AppResult<(StatusCode, Json<DeviceToken>)> {
    let device = state
        .social
        .register_device(actor.as_str(), &request.token, &request.platform)
        .await?;
    Ok((StatusCode::CREATED, Json(device)))
}

/// Operators only. Everyone else gets 403.
async fn send_notice(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<NoticeRequest>,
) -> AppResult<Json<NoticeBroadcast>> {
    if !state.social.may_broadcast(actor.as_str()).await? {
        return Err(CoreError::PermissionDenied.into());
    }
    let broadcast = state
        .social
        .broadcast_notice(actor.as_str(), &request.title, &request.body)
        .await?;
    Ok(Json(broadcast))
}
