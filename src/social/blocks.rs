// Profile blocks
use async_trait::async_trait;
use rusqlite::params;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::identity::ProfileId;
use crate::state::DbPool;

#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Returns true when the block is new.
    async fn block(&self, blocker: &ProfileId, blocked: &ProfileId) -> CoreResult<bool>;

    async fn unblock(&self, blocker: &ProfileId, blocked: &ProfileId) -> CoreResult<bool>;

    async fn blocked_by(&self, blocker: &ProfileId) -> CoreResult<Vec<ProfileId>>;

    async fn is_blocked(&self, blocker: &ProfileId, blocked: &ProfileId) -> CoreResult<bool>;
}

pub struct SqliteBlockStore {
    pool: DbPool,
}

impl SqliteBlockStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlockStore for SqliteBlockStore {
    async fn block(&self, blocker: &ProfileId, blocked: &ProfileId) -> CoreResult<bool> {
        if blocker == blocked {
            return Err(CoreError::InvalidInput(
                "A profile cannot block itself".to_string(),
            ));
        }
        let conn = self.pool.get()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO blocked_users (blocker_id, blocked_id) VALUES (?1, ?2)",
            params![blocker.as_str(), blocked.as_str()],
        )?;
        Ok(inserted > 0)
    }

    async fn unblock(&self, blocker: &ProfileId, blocked: &ProfileId) -> CoreResult<bool> {
        let conn = self.pool.get()?;
        let removed = conn.execute(
            "DELETE FROM blocked_users WHERE blocker_id = ?1 AND blocked_id = ?2",
            params![blocker.as_str(), blocked.as_str()],
        )?;
        Ok(removed > 0)
    }

    async fn blocked_by(&self, blocker: &ProfileId) -> CoreResult<Vec<ProfileId>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT blocked_id FROM blocked_users WHERE blocker_id = ?1 ORDER BY created_at",
        )?;
        let blocked = stmt
            .query_map(params![blocker.as_str()], |row| row.get::<_, String>(0))?
            .map(|r| r.map(ProfileId))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocked)
    }

    async fn is_blocked(&self, blocker: &ProfileId, blocked: &ProfileId) -> CoreResult<bool> {
        let conn = self.pool.get()?;
        let blocked: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM blocked_users WHERE blocker_id = ?1 AND blocked_id = ?2",
            params![blocker.as_str(), blocked.as_str()],
            |row| row.get(0),
        )?;
        Ok(blocked)
    }
}

pub type DynBlockStore = Arc<dyn BlockStore>;
