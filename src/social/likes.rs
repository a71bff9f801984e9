// Like state for posts and reviews
use async_trait::async_trait;
use rusqlite::{params, Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CoreResult;
use crate::identity::ProfileId;
use crate::notifications::repository::{delete_matching_on, insert_if_absent_on};
use crate::notifications::{NewNotification, Notification};
use crate::state::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeTarget {
    Post,
    Review,
}

impl LikeTarget {
    fn table(&self) -> &'static str {
        match self {
            Self::Post => "post_likes",
            Self::Review => "review_likes",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::Post => "post_id",
            Self::Review => "review_id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOp {
    Like,
    Unlike,
    Toggle,
}

/// Result of a like mutation, as the caller should render it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: u64,
    /// Whether this call changed anything
    #[serde(skip)]
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeChange {
    pub state: LikeState,
    /// The like notification written in the same transaction, if any
    pub created: Option<Notification>,
}

/// Set-state operations are idempotent. The primary key on each like table
/// keeps at most one row per (target, profile).
///
/// When a notification is passed, the like row and the notification row move
/// together: a like that took effect inserts it, and any unliked outcome
/// deletes every row for its tuple. Both writes share one IMMEDIATE
/// transaction, so concurrent calls cannot leave a notification behind for a
/// like that no longer exists.
#[async_trait]
pub trait LikeStore: Send + Sync {
    async fn apply(
        &self,
        target: LikeTarget,
        id: &str,
        profile: &ProfileId,
        op: LikeOp,
        notification: Option<&NewNotification>,
    ) -> CoreResult<LikeChange>;
}

pub type DynLikeStore = Arc<dyn LikeStore>;

pub struct SqliteLikeStore {
    pool: DbPool,
}

impl SqliteLikeStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn count_on(conn: &Connection, target: LikeTarget, id: &str) -> CoreResult<u64> {
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            target.table(),
            target.column()
        ),
        params![id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn insert_like(
    conn: &Connection,
    target: LikeTarget,
    id: &str,
    profile: &ProfileId,
) -> CoreResult<bool> {
    let inserted = conn.execute(
        &format!(
            "INSERT OR IGNORE INTO {} ({}, profile_id) VALUES (?1, ?2)",
            target.table(),
            target.column()
        ),
        params![id, profile.as_str()],
    )?;
    Ok(inserted > 0)
}

fn delete_like(
    conn: &Connection,
    target: LikeTarget,
    id: &str,
    profile: &ProfileId,
) -> CoreResult<bool> {
    let removed = conn.execute(
        &format!(
            "DELETE FROM {} WHERE {} = ?1 AND profile_id = ?2",
            target.table(),
            target.column()
        ),
        params![id, profile.as_str()],
    )?;
    Ok(removed > 0)
}

#[async_trait]
impl LikeStore for SqliteLikeStore {
    async fn apply(
        &self,
        target: LikeTarget,
        id: &str,
        profile: &ProfileId,
        op: LikeOp,
        notification: Option<&NewNotification>,
    ) -> CoreResult<LikeChange> {
        let mut conn = self.pool.get()?;
        // Serializes concurrent mutations of the same like
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (liked, changed) = match op {
            LikeOp::Like => (true, insert_like(&tx, target, id, profile)?),
            LikeOp::Unlike => (false, delete_like(&tx, target, id, profile)?),
            LikeOp::Toggle => {
                if delete_like(&tx, target, id, profile)? {
                    (false, true)
                } else {
                    (true, insert_like(&tx, target, id, profile)?)
                }
            }
        };

        let created = match notification {
            Some(new) if liked && changed => insert_if_absent_on(&tx, new)?,
            Some(new) if !liked => {
                delete_matching_on(
                    &tx,
                    new.kind,
                    &new.source_ref,
                    &new.from_profile_id,
                    &new.to_profile_id,
                )?;
                None
            }
            _ => None,
        };

        let like_count = count_on(&tx, target, id)?;
        tx.commit()?;

        Ok(LikeChange {
            state: LikeState {
                liked,
                like_count,
                changed,
            },
            created,
        })
    }
}
