// Abuse reports
use async_trait::async_trait;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{is_unique_violation, now_timestamp};
use crate::error::{CoreError, CoreResult};
use crate::identity::ProfileId;
use crate::state::DbPool;

pub const MAX_REASON_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Spam,
    Inappropriate,
    InappropriateImage,
    Harassment,
    Other,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::Inappropriate => "inappropriate",
            Self::InappropriateImage => "inappropriate_image",
            Self::Harassment => "harassment",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTarget {
    Post,
    Comment,
    Profile,
}

impl ReportTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::Profile => "profile",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub reporter: ProfileId,
    pub target: ReportTarget,
    pub target_id: String,
    /// Post the reported comment lives on, for moderator context
    pub post_id: Option<String>,
    pub kind: ReportKind,
    pub reason: String,
}

/// What the reporter is told. The same for first and repeated submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReceipt {
    Accepted,
}

/// Trim and bound a report reason.
pub fn normalize_reason(reason: &str) -> CoreResult<String> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput(
            "Report reason must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_REASON_CHARS {
        return Err(CoreError::InvalidInput(format!(
            "Report reason must be at most {} characters",
            MAX_REASON_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Fails with `DuplicateSubmission` when the reporter already reported
    /// the target.
    async fn insert(&self, report: &NewReport) -> CoreResult<String>;

    async fn count_for_target(&self, target: ReportTarget, target_id: &str) -> CoreResult<u64>;
}

pub struct SqliteReportStore {
    pool: DbPool,
}

impl SqliteReportStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn insert(&self, report: &NewReport) -> CoreResult<String> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        let result = conn.execute(
            "INSERT INTO reports
                (id, reporter_id, target_type, target_id, post_id, kind, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                report.reporter.as_str(),
                report.target.as_str(),
                report.target_id,
                report.post_id,
                report.kind.as_str(),
                report.reason,
                now_timestamp(),
            ],
        );

        match result {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => Err(CoreError::DuplicateSubmission),
            Err(e) => Err(e.into()),
        }
    }

    async fn count_for_target(&self, target: ReportTarget, target_id: &str) -> CoreResult<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reports WHERE target_type = ?1 AND target_id = ?2",
            params![target.as_str(), target_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

pub type DynReportStore = Arc<dyn ReportStore>;
