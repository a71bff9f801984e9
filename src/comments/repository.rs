// Repository pattern - isolates all comment persistence
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::Arc;

use crate::comments::domain::{normalize_content, Comment, CommentId, PostId, TOMBSTONE};
use crate::db::{format_timestamp, now_timestamp, optional_timestamp_column, timestamp_column};
use crate::error::{CoreError, CoreResult};
use crate::identity::ProfileId;
use crate::state::DbPool;

const COMMENT_COLUMNS: &str = "seq, id, post_id, author_id, parent_id, content, created_at, updated_at, is_edited, is_deleted";

#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Append a comment. A parent must already exist on the same post.
    async fn create(
        &self,
        post_id: &PostId,
        author: &ProfileId,
        parent_id: Option<&CommentId>,
        content: &str,
    ) -> CoreResult<Comment>;

    async fn get(&self, id: &CommentId) -> CoreResult<Option<Comment>>;

    /// All comments of a post, tombstones included, in `(created_at, seq)` order
    async fn list_for_post(&self, post_id: &PostId) -> CoreResult<Vec<Comment>>;

    async fn count_for_post(&self, post_id: &PostId) -> CoreResult<u64>;

    /// Author-only content change
    async fn edit(
        &self,
        id: &CommentId,
        requester: &ProfileId,
        new_content: &str,
    ) -> CoreResult<Comment>;

    /// Author-only. Keeps the row and its place in the thread.
    async fn soft_delete(&self, id: &CommentId, requester: &ProfileId) -> CoreResult<Comment>;
}

pub struct SqliteCommentStore {
    pool: DbPool,
}

impl SqliteCommentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        seq: row.get(0)?,
        id: CommentId(row.get(1)?),
        post_id: PostId(row.get(2)?),
        author_id: ProfileId(row.get(3)?),
        parent_id: row.get::<_, Option<String>>(4)?.map(CommentId),
        content: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
        updated_at: optional_timestamp_column(row, 7)?,
        is_edited: row.get(8)?,
        is_deleted: row.get(9)?,
    })
}

fn load_comment(conn: &Connection, id: &CommentId) -> CoreResult<Option<Comment>> {
    let comment = conn
        .query_row(
            &format!("SELECT {} FROM comments WHERE id = ?1", COMMENT_COLUMNS),
            params![id.as_str()],
            comment_from_row,
        )
        .optional()?;
    Ok(comment)
}

/// Load a comment the requester is allowed to mutate.
fn load_owned(conn: &Connection, id: &CommentId, requester: &ProfileId) -> CoreResult<Comment> {
    let comment =
        load_comment(conn, id)?.ok_or_else(|| CoreError::CommentNotFound(id.to_string()))?;
    if !comment.is_authored_by(requester) {
        tracing::debug!(
            "Profile {} may not modify comment {} owned by {}",
            requester,
            id,
            comment.author_id
        );
        return Err(CoreError::PermissionDenied);
    }
    Ok(comment)
}

#[async_trait]
impl CommentStore for SqliteCommentStore {
    async fn create(
        &self,
        post_id: &PostId,
        author: &ProfileId,
        parent_id: Option<&CommentId>,
        content: &str,
    ) -> CoreResult<Comment> {
        let content = normalize_content(content)?;
        let mut conn = self.pool.get()?;

        // Parent check and insert must see the same snapshot
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let post_exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
            params![post_id.as_str()],
            |row| row.get(0),
        )?;
        if !post_exists {
            return Err(CoreError::PostNotFound(post_id.to_string()));
        }

        if let Some(parent_id) = parent_id {
            let parent_post: Option<String> = tx
                .query_row(
                    "SELECT post_id FROM comments WHERE id = ?1",
                    params![parent_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            match parent_post {
                None => {
                    return Err(CoreError::InvalidParent(format!(
                        "{} does not exist",
                        parent_id
                    )))
                }
                Some(parent_post) if parent_post != post_id.as_str() => {
                    return Err(CoreError::InvalidParent(format!(
                        "{} belongs to another post",
                        parent_id
                    )))
                }
                Some(_) => {}
            }
        }

        let id = CommentId::generate();
        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO comments (id, post_id, author_id, parent_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_str(),
                post_id.as_str(),
                author.as_str(),
                parent_id.map(|p| p.as_str()),
                content,
                format_timestamp(created_at),
            ],
        )?;
        let comment =
            load_comment(&tx, &id)?.ok_or_else(|| CoreError::CommentNotFound(id.to_string()))?;
        tx.commit()?;

        tracing::debug!(
            "Comment {} (seq {}) created on post {}",
            comment.id,
            comment.seq,
            post_id
        );
        Ok(comment)
    }

    async fn get(&self, id: &CommentId) -> CoreResult<Option<Comment>> {
        let conn = self.pool.get()?;
        load_comment(&conn, id)
    }

    async fn list_for_post(&self, post_id: &PostId) -> CoreResult<Vec<Comment>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM comments WHERE post_id = ?1 ORDER BY created_at ASC, seq ASC",
            COMMENT_COLUMNS
        ))?;
        let comments = stmt
            .query_map(params![post_id.as_str()], comment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    async fn count_for_post(&self, post_id: &PostId) -> CoreResult<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
            params![post_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn edit(
        &self,
        id: &CommentId,
        requester: &ProfileId,
        new_content: &str,
    ) -> CoreResult<Comment> {
        let content = normalize_content(new_content)?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let comment = load_owned(&tx, id, requester)?;
        if comment.is_deleted {
            return Err(CoreError::InvalidInput(
                "Deleted comments cannot be edited".to_string(),
            ));
        }

        tx.execute(
            "UPDATE comments SET content = ?1, updated_at = ?2, is_edited = 1 WHERE id = ?3",
            params![content, now_timestamp(), id.as_str()],
        )?;
        let updated = load_comment(&tx, id)?.ok_or_else(|| CoreError::CommentNotFound(id.to_string()))?;
        tx.commit()?;

        Ok(updated)
    }

    async fn soft_delete(&self, id: &CommentId, requester: &ProfileId) -> CoreResult<Comment> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let comment = load_owned(&tx, id, requester)?;
        if comment.is_deleted {
            return Ok(comment);
        }

        tx.execute(
            "UPDATE comments SET is_deleted = 1, content = ?1 WHERE id = ?2",
            params![TOMBSTONE, id.as_str()],
        )?;
        let updated = load_comment(&tx, id)?.ok_or_else(|| CoreError::CommentNotFound(id.to_string()))?;
        tx.commit()?;

        tracing::info!("Comment {} soft-deleted by {}", id, requester);
        Ok(updated)
    }
}

pub type DynCommentStore = Arc<dyn CommentStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_post, insert_profile, test_pool};

    fn create_test_store() -> (SqliteCommentStore, tempfile::TempDir) {
        let (pool, tmp) = test_pool();
        insert_profile(&pool, "ana", None, "Ana");
        insert_profile(&pool, "ben", None, "Ben");
        insert_post(&pool, "post-1", "ben");
        insert_post(&pool, "post-2", "ben");
        (SqliteCommentStore::new(pool), tmp)
    }

    fn ana() -> ProfileId {
        ProfileId::new("ana")
    }

    fn ben() -> ProfileId {
        ProfileId::new("ben")
    }

    #[tokio::test]
    async fn create_and_list_in_order() {
        let (store, _tmp) = create_test_store();
        let post = PostId::new("post-1");

        let first = store.create(&post, &ana(), None, "first").await.unwrap();
        let second = store.create(&post, &ben(), None, "second").await.unwrap();

        assert!(second.seq > first.seq);
        let listed = store.list_for_post(&post).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(listed[0].author_id, ana());
        assert!(!listed[0].is_edited);
    }

    #[tokio::test]
    async fn create_rejects_unknown_post() {
        let (store, _tmp) = create_test_store();
        let err = store
            .create(&PostId::new("nope"), &ana(), None, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PostNotFound(_)));
    }

    #[tokio::test]
    async fn reply_must_reference_existing_parent() {
        let (store, _tmp) = create_test_store();
        let err = store
            .create(
                &PostId::new("post-1"),
                &ana(),
                Some(&CommentId::new("ghost")),
                "reply",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidParent(_)));
    }

    #[tokio::test]
    async fn reply_cannot_cross_posts() {
        let (store, _tmp) = create_test_store();
        let parent = store
            .create(&PostId::new("post-1"), &ana(), None, "top")
            .await
            .unwrap();

        let err = store
            .create(&PostId::new("post-2"), &ben(), Some(&parent.id), "stray")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidParent(_)));
        assert_eq!(
            store.count_for_post(&PostId::new("post-2")).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn create_rejects_blank_content() {
        let (store, _tmp) = create_test_store();
        let err = store
            .create(&PostId::new("post-1"), &ana(), None, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn edit_by_author_marks_edited() {
        let (store, _tmp) = create_test_store();
        let comment = store
            .create(&PostId::new("post-1"), &ana(), None, "typo")
            .await
            .unwrap();

        let edited = store.edit(&comment.id, &ana(), " fixed ").await.unwrap();
        assert_eq!(edited.content, "fixed");
        assert!(edited.is_edited);
        assert!(edited.updated_at.is_some());
        assert_eq!(edited.seq, comment.seq);
    }

    #[tokio::test]
    async fn edit_by_other_profile_is_denied() {
        let (store, _tmp) = create_test_store();
        let comment = store
            .create(&PostId::new("post-1"), &ana(), None, "mine")
            .await
            .unwrap();

        let err = store.edit(&comment.id, &ben(), "hijack").await.unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied));

        let unchanged = store.get(&comment.id).await.unwrap().unwrap();
        assert_eq!(unchanged.content, "mine");
        assert!(!unchanged.is_edited);
    }

    #[tokio::test]
    async fn soft_delete_keeps_row_and_replies() {
        let (store, _tmp) = create_test_store();
        let post = PostId::new("post-1");
        let parent = store.create(&post, &ana(), None, "parent").await.unwrap();
        let reply = store
            .create(&post, &ben(), Some(&parent.id), "reply")
            .await
            .unwrap();

        let deleted = store.soft_delete(&parent.id, &ana()).await.unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.content, TOMBSTONE);
        assert_eq!(deleted.id, parent.id);

        // Counts include tombstones
        assert_eq!(store.count_for_post(&post).await.unwrap(), 2);
        let reply_after = store.get(&reply.id).await.unwrap().unwrap();
        assert_eq!(reply_after, reply);

        // Deleting twice is a no-op
        let again = store.soft_delete(&parent.id, &ana()).await.unwrap();
        assert_eq!(again, deleted);
    }

    #[tokio::test]
    async fn soft_delete_by_other_profile_is_denied() {
        let (store, _tmp) = create_test_store();
        let comment = store
            .create(&PostId::new("post-1"), &ana(), None, "keep me")
            .await
            .unwrap();

        let err = store.soft_delete(&comment.id, &ben()).await.unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied));
        assert!(!store.get(&comment.id).await.unwrap().unwrap().is_deleted);
    }

    #[tokio::test]
    async fn deleted_comment_cannot_be_edited() {
        let (store, _tmp) = create_test_store();
        let comment = store
            .create(&PostId::new("post-1"), &ana(), None, "gone soon")
            .await
            .unwrap();
        store.soft_delete(&comment.id, &ana()).await.unwrap();

        let err = store.edit(&comment.id, &ana(), "revive").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn missing_comment_is_not_found() {
        let (store, _tmp) = create_test_store();
        let err = store
            .soft_delete(&CommentId::new("ghost"), &ana())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CommentNotFound(_)));
    }
}
