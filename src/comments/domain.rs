// Comment domain types
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::identity::ProfileId;

/// Content shown in place of a soft-deleted comment.
pub const TOMBSTONE: &str = "This comment has been deleted.";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub String);

impl CommentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Insertion order, used to break `created_at` ties
    pub seq: i64,
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: ProfileId,
    pub parent_id: Option<CommentId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_edited: bool,
    pub is_deleted: bool,
}

impl Comment {
    pub fn is_authored_by(&self, profile: &ProfileId) -> bool {
        &self.author_id == profile
    }
}

/// Trim and reject empty comment bodies.
pub fn normalize_content(content: &str) -> CoreResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput(
            "Comment content must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
