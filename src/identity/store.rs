// Profile lookups - the only place that touches the profiles table
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use crate::db::models::Profile;
use crate::error::CoreResult;
use crate::identity::{AuthId, ProfileId};
use crate::state::DbPool;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_auth_id(&self, id: &AuthId) -> CoreResult<Option<ProfileId>>;

    async fn find_by_profile_id(&self, id: &str) -> CoreResult<Option<ProfileId>>;

    async fn get(&self, id: &ProfileId) -> CoreResult<Option<Profile>>;

    async fn create(
        &self,
        auth_id: Option<&AuthId>,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> CoreResult<Profile>;

    /// Every profile id, oldest first
    async fn list_ids(&self) -> CoreResult<Vec<ProfileId>>;
}

pub struct SqliteProfileStore {
    pool: DbPool,
}

impl SqliteProfileStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn find_by_auth_id(&self, id: &AuthId) -> CoreResult<Option<ProfileId>> {
        let conn = self.pool.get()?;
        let found = conn
            .query_row(
                "SELECT id FROM profiles WHERE auth_user_id = ?1",
                params![id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(found.map(ProfileId))
    }

    async fn find_by_profile_id(&self, id: &str) -> CoreResult<Option<ProfileId>> {
        let conn = self.pool.get()?;
        let found = conn
            .query_row(
                "SELECT id FROM profiles WHERE id = ?1",
                params![id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(found.map(ProfileId))
    }

    async fn get(&self, id: &ProfileId) -> CoreResult<Option<Profile>> {
        let conn = self.pool.get()?;
        let profile = conn
            .query_row(
                "SELECT id, auth_user_id, display_name, avatar_url FROM profiles WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(Profile {
                        id: row.get(0)?,
                        auth_user_id: row.get(1)?,
                        display_name: row.get(2)?,
                        avatar_url: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    async fn create(
        &self,
        auth_id: Option<&AuthId>,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> CoreResult<Profile> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        let auth_user_id = auth_id.map(|a| a.as_str().to_string());

        conn.execute(
            "INSERT INTO profiles (id, auth_user_id, display_name, avatar_url)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, auth_user_id, display_name, avatar_url],
        )?;

        Ok(Profile {
            id,
            auth_user_id,
            display_name: display_name.to_string(),
            avatar_url: avatar_url.map(str::to_string),
        })
    }

    async fn list_ids(&self) -> CoreResult<Vec<ProfileId>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id FROM profiles ORDER BY created_at, id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|r| r.map(ProfileId))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

pub type DynProfileStore = Arc<dyn ProfileStore>;
