pub mod comments;
pub mod likes;
pub mod moderation;
pub mod notifications;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full application: routes, request tracing and shared state.
pub fn app(state: AppState) -> Router {
    router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Every JSON route, without state or middleware applied.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(comments::router())
        .merge(likes::router())
        .merge(moderation::router())
        .merge(notifications::router())
}

async fn health() -> &'static str {
    "ok"
}
