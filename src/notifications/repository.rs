// Repository pattern - isolates notification persistence
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use crate::db::{is_unique_violation, now_timestamp, timestamp_column};
use crate::error::CoreResult;
use crate::identity::ProfileId;
use crate::notifications::domain::{
    NewNotification, Notification, NotificationKind, NotificationPayload, SourceRef,
};
use crate::state::DbPool;

const NOTIFICATION_COLUMNS: &str =
    "id, type, source_ref, from_profile_id, to_profile_id, payload, is_read, created_at";

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert unless an unread row exists for the same dedup tuple.
    /// Returns `None` when the uniqueness constraint rejected the row.
    async fn insert_if_absent(&self, new: &NewNotification) -> CoreResult<Option<Notification>>;

    /// Remove every row for the tuple, read or unread. Returns rows removed.
    async fn delete_matching(
        &self,
        kind: NotificationKind,
        source_ref: &SourceRef,
        from: &ProfileId,
        to: &ProfileId,
    ) -> CoreResult<usize>;

    async fn get(&self, id: &str) -> CoreResult<Option<Notification>>;

    /// Newest first
    async fn list_for_recipient(
        &self,
        recipient: &ProfileId,
        limit: u32,
    ) -> CoreResult<Vec<Notification>>;

    /// Returns false when no such notification belongs to the recipient.
    async fn mark_read(&self, id: &str, recipient: &ProfileId) -> CoreResult<bool>;

    async fn mark_all_read(&self, recipient: &ProfileId) -> CoreResult<usize>;

    /// Unread count, notices excluded
    async fn unread_count(&self, recipient: &ProfileId) -> CoreResult<u64>;
}

pub struct SqliteNotificationStore {
    pool: DbPool,
}

impl SqliteNotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

#[derive(Debug, thiserror::Error)]
#[error("unknown notification type: {0}")]
struct UnknownKind(String);

fn notification_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let kind: String = row.get(1)?;
    let kind = NotificationKind::parse(&kind).ok_or_else(|| conversion_error(1, UnknownKind(kind)))?;
    let payload: String = row.get(5)?;
    let payload: NotificationPayload =
        serde_json::from_str(&payload).map_err(|e| conversion_error(5, e))?;

    Ok(Notification {
        id: row.get(0)?,
        kind,
        source_ref: SourceRef(row.get(2)?),
        from_profile_id: ProfileId(row.get(3)?),
        to_profile_id: ProfileId(row.get(4)?),
        payload,
        is_read: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
    })
}

/// Insert on a caller-owned connection, so the row can share a transaction
/// with the write that triggered it. `None` when an unread row for the same
/// tuple already exists.
pub fn insert_if_absent_on(
    conn: &Connection,
    new: &NewNotification,
) -> CoreResult<Option<Notification>> {
    let id = uuid::Uuid::now_v7().to_string();
    let payload = serde_json::to_string(&new.payload)?;

    let inserted = conn.execute(
        "INSERT INTO notifications
            (id, type, source_ref, from_profile_id, to_profile_id, payload, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        params![
            id,
            new.kind.as_str(),
            new.source_ref.as_str(),
            new.from_profile_id.as_str(),
            new.to_profile_id.as_str(),
            payload,
            now_timestamp(),
        ],
    );

    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let notification = conn
        .query_row(
            &format!(
                "SELECT {} FROM notifications WHERE id = ?1",
                NOTIFICATION_COLUMNS
            ),
            params![id],
            notification_from_row,
        )
        .optional()?;
    Ok(notification)
}

pub fn delete_matching_on(
    conn: &Connection,
    kind: NotificationKind,
    source_ref: &SourceRef,
    from: &ProfileId,
    to: &ProfileId,
) -> CoreResult<usize> {
    let removed = conn.execute(
        "DELETE FROM notifications
         WHERE type = ?1 AND source_ref = ?2 AND from_profile_id = ?3 AND to_profile_id = ?4",
        params![kind.as_str(), source_ref.as_str(), from.as_str(), to.as_str()],
    )?;
    Ok(removed)
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    async fn insert_if_absent(&self, new: &NewNotification) -> CoreResult<Option<Notification>> {
        let conn = self.pool.get()?;
        insert_if_absent_on(&conn, new)
    }

    async fn delete_matching(
        &self,
        kind: NotificationKind,
        source_ref: &SourceRef,
        from: &ProfileId,
        to: &ProfileId,
    ) -> CoreResult<usize> {
        let conn = self.pool.get()?;
        delete_matching_on(&conn, kind, source_ref, from, to)
    }

    async fn get(&self, id: &str) -> CoreResult<Option<Notification>> {
        let conn = self.pool.get()?;
        let notification = conn
            .query_row(
                &format!(
                    "SELECT {} FROM notifications WHERE id = ?1",
                    NOTIFICATION_COLUMNS
                ),
                params![id],
                notification_from_row,
            )
            .optional()?;
        Ok(notification)
    }

    async fn list_for_recipient(
        &self,
        recipient: &ProfileId,
        limit: u32,
    ) -> CoreResult<Vec<Notification>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications
             WHERE to_profile_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
            NOTIFICATION_COLUMNS
        ))?;
        let notifications = stmt
            .query_map(params![recipient.as_str(), limit], notification_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    async fn mark_read(&self, id: &str, recipient: &ProfileId) -> CoreResult<bool> {
        let conn = self.pool.get()?;
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM notifications WHERE id = ?1 AND to_profile_id = ?2",
            params![id, recipient.as_str()],
            |row| row.get(0),
        )?;
        if exists {
            conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND to_profile_id = ?2",
                params![id, recipient.as_str()],
            )?;
        }
        Ok(exists)
    }

    async fn mark_all_read(&self, recipient: &ProfileId) -> CoreResult<usize> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE to_profile_id = ?1 AND is_read = 0",
            params![recipient.as_str()],
        )?;
        Ok(updated)
    }

    async fn unread_count(&self, recipient: &ProfileId) -> CoreResult<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications
             WHERE to_profile_id = ?1 AND is_read = 0 AND type != ?2",
            params![recipient.as_str(), NotificationKind::Notice.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

pub type DynNotificationStore = Arc<dyn NotificationStore>;
