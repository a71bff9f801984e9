use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use crate::comments::PostId;
use crate::error::AppResult;
use crate::extractors::Actor;
use crate::social::LikeState;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/{post_id}/like", post(like_post).delete(unlike_post))
        .route("/reviews/{id}/like", post(like_review).delete(unlike_review))
}

async fn like_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    actor: Actor,
) -> AppResult<Json<LikeState>> {
    let liked = state
        .social
        .like_post(actor.as_str(), &PostId::new(post_id))
        .await?;
    Ok(Json(liked))
}

async fn unlike_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    actor: Actor,
) -> AppResult<Json<LikeState>> {
    let liked = state
        .social
        .unlike_post(actor.as_str(), &PostId::new(post_id))
        .await?;
    Ok(Json(liked))
}

async fn like_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    actor: Actor,
) -> AppResult<Json<LikeState>> {
    Ok(Json(state.social.like_review(actor.as_str(), &id).await?))
}

async fn unlike_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    actor: Actor,
) -> AppResult<Json<LikeState>> {
    Ok(Json(state.social.unlike_review(actor.as_str(), &id).await?))
}
