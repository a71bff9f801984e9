// Device token registry for push delivery
use async_trait::async_trait;
use rusqlite::params;
use std::sync::Arc;

use crate::db::models::DeviceToken;
use crate::db::now_timestamp;
use crate::identity::ProfileId;
use crate::push::PushError;
use crate::state::DbPool;

#[async_trait]
pub trait DeviceTokenStore: Send + Sync {
    /// Bind a token to a profile. Re-registering moves it to the new owner.
    async fn register(
        &self,
        profile: &ProfileId,
        token: &str,
        platform: &str,
    ) -> Result<DeviceToken, PushError>;

    async fn remove(&self, token: &str) -> Result<bool, PushError>;

    async fn tokens_for(&self, profile: &ProfileId) -> Result<Vec<DeviceToken>, PushError>;
}

pub struct SqliteDeviceTokenStore {
    pool: DbPool,
}

impl SqliteDeviceTokenStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceTokenStore for SqliteDeviceTokenStore {
    async fn register(
        &self,
        profile: &ProfileId,
        token: &str,
        platform: &str,
    ) -> Result<DeviceToken, PushError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO device_tokens (token, profile_id, platform, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(token) DO UPDATE SET
                profile_id = excluded.profile_id,
                platform = excluded.platform,
                updated_at = excluded.updated_at",
            params![token, profile.as_str(), platform, now_timestamp()],
        )?;
        Ok(DeviceToken {
            token: token.to_string(),
            profile_id: profile.as_str().to_string(),
            platform: platform.to_string(),
        })
    }

    async fn remove(&self, token: &str) -> Result<bool, PushError> {
        let conn = self.pool.get()?;
        let removed = conn.execute("DELETE FROM device_tokens WHERE token = ?1", params![token])?;
        Ok(removed > 0)
    }

    async fn tokens_for(&self, profile: &ProfileId) -> Result<Vec<DeviceToken>, PushError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT token, profile_id, platform FROM device_tokens
             WHERE profile_id = ?1 ORDER BY updated_at",
        )?;
        let tokens = stmt
            .query_map(params![profile.as_str()], |row| {
                Ok(DeviceToken {
                    token: row.get(0)?,
                    profile_id: row.get(1)?,
                    platform: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tokens)
    }
}

pub type DynDeviceTokenStore = Arc<dyn DeviceTokenStore>;
