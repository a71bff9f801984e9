use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors raised by the comment, identity and notification core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    #[error("Post not found: {0}")]
    PostNotFound(String),

    #[error("Review not found: {0}")]
    ReviewNotFound(String),

    #[error("Invalid parent comment: {0}")]
    InvalidParent(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Raised by stores when a uniqueness constraint rejects an insert.
    /// Callers absorb it into a successful result.
    #[error("Duplicate submission")]
    DuplicateSubmission,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Push(#[from] crate::push::PushError),
}

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Core(err) => match err {
                CoreError::IdentityNotFound(_)
                | CoreError::CommentNotFound(_)
                | CoreError::PostNotFound(_)
                | CoreError::ReviewNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                CoreError::PermissionDenied => (StatusCode::FORBIDDEN, err.to_string()),
                CoreError::InvalidParent(_) | CoreError::InvalidInput(_) => {
                    (StatusCode::BAD_REQUEST, err.to_string())
                }
                CoreError::DuplicateSubmission
                | CoreError::Database(_)
                | CoreError::Pool(_)
                | CoreError::Json(_)
                | CoreError::Push(_) => {
                    tracing::error!("Internal error: {}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    )
                }
            },
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
