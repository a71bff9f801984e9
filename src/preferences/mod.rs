// Per-profile notification opt-ins
use async_trait::async_trait;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CoreResult;
use crate::identity::ProfileId;
use crate::state::DbPool;

/// The five opt-in switches a profile controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Notice,
    Post,
    Comment,
    Reply,
    Review,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notice => "notice",
            Self::Post => "post",
            Self::Comment => "comment",
            Self::Reply => "reply",
            Self::Review => "review",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub notice: bool,
    pub post: bool,
    pub comment: bool,
    pub reply: bool,
    pub review: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            notice: true,
            post: true,
            comment: true,
            reply: true,
            review: true,
        }
    }
}

impl NotificationPreferences {
    pub fn allows(&self, category: NotificationCategory) -> bool {
        match category {
            NotificationCategory::Notice => self.notice,
            NotificationCategory::Post => self.post,
            NotificationCategory::Comment => self.comment,
            NotificationCategory::Reply => self.reply,
            NotificationCategory::Review => self.review,
        }
    }
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Creates the all-enabled row on first access.
    async fn get(&self, profile: &ProfileId) -> CoreResult<NotificationPreferences>;

    async fn save(&self, profile: &ProfileId, prefs: &NotificationPreferences) -> CoreResult<()>;
}

pub struct SqlitePreferenceStore {
    pool: DbPool,
}

impl SqlitePreferenceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    async fn get(&self, profile: &ProfileId) -> CoreResult<NotificationPreferences> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR IGNORE INTO notification_settings (profile_id) VALUES (?1)",
            params![profile.as_str()],
        )?;
        let prefs = conn.query_row(
            "SELECT notice, post, comment, reply, review
             FROM notification_settings WHERE profile_id = ?1",
            params![profile.as_str()],
            |row| {
                Ok(NotificationPreferences {
                    notice: row.get(0)?,
                    post: row.get(1)?,
                    comment: row.get(2)?,
                    reply: row.get(3)?,
                    review: row.get(4)?,
                })
            },
        )?;
        Ok(prefs)
    }

    async fn save(&self, profile: &ProfileId, prefs: &NotificationPreferences) -> CoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO notification_settings (profile_id, notice, post, comment, reply, review)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(profile_id) DO UPDATE SET
                notice = excluded.notice,
                post = excluded.post,
                comment = excluded.comment,
                reply = excluded.reply,
                review = excluded.review",
            params![
                profile.as_str(),
                prefs.notice,
                prefs.post,
                prefs.comment,
                prefs.reply,
                prefs.review
            ],
        )?;
        tracing::debug!("Saved notification preferences for {}", profile);
        Ok(())
    }
}

pub type DynPreferenceStore = Arc<dyn PreferenceStore>;
