// Posts and reviews, only as far as authorship lookups need them
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use crate::comments::PostId;
use crate::db::models::{Post, Review};
use crate::error::CoreResult;
use crate::identity::ProfileId;
use crate::state::DbPool;

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn post(&self, id: &PostId) -> CoreResult<Option<Post>>;

    async fn review(&self, id: &str) -> CoreResult<Option<Review>>;

    async fn create_post(&self, author: &ProfileId) -> CoreResult<Post>;

    async fn create_review(&self, author: &ProfileId, subject: &str) -> CoreResult<Review>;
}

pub struct SqliteContentStore {
    pool: DbPool,
}

impl SqliteContentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn post(&self, id: &PostId) -> CoreResult<Option<Post>> {
        let conn = self.pool.get()?;
        let post = conn
            .query_row(
                "SELECT id, author_id FROM posts WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(Post {
                        id: row.get(0)?,
                        author_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(post)
    }

    async fn review(&self, id: &str) -> CoreResult<Option<Review>> {
        let conn = self.pool.get()?;
        let review = conn
            .query_row(
                "SELECT id, author_id, subject FROM reviews WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Review {
                        id: row.get(0)?,
                        author_id: row.get(1)?,
                        subject: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(review)
    }

    async fn create_post(&self, author: &ProfileId) -> CoreResult<Post> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO posts (id, author_id) VALUES (?1, ?2)",
            params![id, author.as_str()],
        )?;
        Ok(Post {
            id,
            author_id: author.as_str().to_string(),
        })
    }

    async fn create_review(&self, author: &ProfileId, subject: &str) -> CoreResult<Review> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO reviews (id, author_id, subject) VALUES (?1, ?2, ?3)",
            params![id, author.as_str(), subject],
        )?;
        Ok(Review {
            id,
            author_id: author.as_str().to_string(),
            subject: subject.to_string(),
        })
    }
}

pub type DynContentStore = Arc<dyn ContentStore>;
