// Notification domain types
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::ProfileId;
use crate::preferences::NotificationCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Comment,
    Reply,
    ReviewLike,
    Notice,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Reply => "reply",
            Self::ReviewLike => "review_like",
            Self::Notice => "notice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(Self::Like),
            "comment" => Some(Self::Comment),
            "reply" => Some(Self::Reply),
            "review_like" => Some(Self::ReviewLike),
            "notice" => Some(Self::Notice),
            _ => None,
        }
    }

    /// The preference switch gating push delivery for this kind.
    pub fn category(&self) -> NotificationCategory {
        match self {
            Self::Like => NotificationCategory::Post,
            Self::Comment => NotificationCategory::Comment,
            Self::Reply => NotificationCategory::Reply,
            Self::ReviewLike => NotificationCategory::Review,
            Self::Notice => NotificationCategory::Notice,
        }
    }

    pub fn is_notice(&self) -> bool {
        matches!(self, Self::Notice)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post id for likes and comments, parent comment id for replies, review id
/// for review likes, generated notice id for notices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(pub String);

impl SourceRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display snapshot taken when the notification is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub actor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Review subject, or notice title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl NotificationPayload {
    pub fn actor(name: impl Into<String>) -> Self {
        Self {
            actor_name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_avatar(mut self, avatar: Option<String>) -> Self {
        self.actor_avatar = avatar;
        self
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub source_ref: SourceRef,
    pub from_profile_id: ProfileId,
    pub to_profile_id: ProfileId,
    pub payload: NotificationPayload,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification about to be written, with identities already resolved.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub source_ref: SourceRef,
    pub from_profile_id: ProfileId,
    pub to_profile_id: ProfileId,
    pub payload: NotificationPayload,
}

impl NewNotification {
    /// Sender and recipient are the same profile. Notices are exempt.
    pub fn is_self_addressed(&self) -> bool {
        self.from_profile_id == self.to_profile_id && !self.kind.is_notice()
    }
}
