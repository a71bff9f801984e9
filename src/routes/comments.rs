use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::comments::{Comment, CommentId, PostId, ThreadView};
use crate::error::AppResult;
use crate::extractors::{Actor, MaybeActor};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct NewCommentRequest {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Deserialize)]
pub struct EditCommentRequest {
    pub content: String,
}

#[derive(Serialize)]
pub struct ThreadResponse {
    pub post_id: PostId,
    pub count: u64,
    pub comments: Vec<ThreadView>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/posts/{post_id}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/comments/{id}", patch(edit_comment).delete(delete_comment))
}

async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    viewer: MaybeActor,
) -> AppResult<Json<ThreadResponse>> {
    let post_id = PostId::new(post_id);
    let viewer = viewer.0.as_ref().map(|a| a.as_str());
    let comments = state.social.post_thread(&post_id, viewer).await?;
    let count = state.social.comment_count(&post_id).await?;

    Ok(Json(ThreadResponse {
        post_id,
        count,
        comments,
    }))
}

async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    actor: Actor,
    Json(request): Json<NewCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let parent_id = request.parent_id.map(CommentId::new);
    let comment = state
        .social
        .post_comment(
            actor.as_str(),
            &PostId::new(post_id),
            parent_id.as_ref(),
            &request.content,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn edit_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    actor: Actor,
    Json(request): Json<EditCommentRequest>,
) -> AppResult<Json<Comment>> {
    let comment = state
        .social
        .edit_comment(actor.as_str(), &CommentId::new(id), &request.content)
        .await?;
    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    actor: Actor,
) -> AppResult<Json<Comment>> {
    let comment = state
        .social
        .delete_comment(actor.as_str(), &CommentId::new(id))
        .await?;
    Ok(Json(comment))
}
