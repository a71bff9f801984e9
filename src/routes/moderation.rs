// Reports and blocks
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::extractors::Actor;
use crate::social::{ReportKind, ReportTarget};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReportRequest {
    pub target_type: ReportTarget,
    pub target_id: String,
    pub kind: ReportKind,
    pub reason: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports", post(submit_report))
        .route(
            "/blocks/{profile_id}",
            post(block_profile).delete(unblock_profile),
        )
}

async fn submit_report(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<ReportRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let receipt = state
        .social
        .submit_report(
            actor.as_str(),
            request.target_type,
            &request.target_id,
            request.kind,
            &request.reason,
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": receipt }))))
}

async fn block_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
    actor: Actor,
) -> AppResult<Json<Value>> {
    state.social.block(actor.as_str(), &profile_id).await?;
    Ok(Json(json!({ "blocked": true })))
}

async fn unblock_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
    actor: Actor,
) -> AppResult<Json<Value>> {
    state.social.unblock(actor.as_str(), &profile_id).await?;
    Ok(Json(json!({ "blocked": false })))
}
