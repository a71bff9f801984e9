use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// The acting identifier as passed by the authenticating gateway. May be an
/// auth id or a profile id; handlers hand it to the service unresolved.
#[derive(Debug, Clone)]
pub struct Actor(pub String);

impl Actor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn actor_from_parts(parts: &Parts, state: &AppState) -> Option<Actor> {
    parts
        .headers
        .get(state.config.auth.actor_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| Actor(v.to_string()))
}

/// Requires an actor. Returns 401 when the header is missing or empty.
impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        actor_from_parts(parts, state).ok_or(AppError::Unauthorized)
    }
}

/// Optional actor, for read endpoints that anonymous viewers may call.
pub struct MaybeActor(pub Option<Actor>);

impl FromRequestParts<AppState> for MaybeActor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeActor(actor_from_parts(parts, state)))
    }
}
