// Pairs each triggering write with the notification it produces or removes
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::comments::{
    organize, Comment, CommentId, DynCommentStore, PostId, SqliteCommentStore, ThreadView,
};
use crate::db::models::{DeviceToken, Post, Review};
use crate::error::{CoreError, CoreResult};
use crate::identity::{DynProfileStore, IdentityResolver, ProfileId, SqliteProfileStore};
use crate::notifications::{
    NewNotification, NoticeBroadcast, Notification, NotificationDispatcher, NotificationKind,
    NotificationPayload, PushStats, SourceRef, SqliteNotificationStore,
};
use crate::preferences::{DynPreferenceStore, NotificationPreferences, SqlitePreferenceStore};
use crate::push::tokens::{DynDeviceTokenStore, SqliteDeviceTokenStore};
use crate::push::{truncate, DynPushTransport};
use crate::social::blocks::{DynBlockStore, SqliteBlockStore};
use crate::social::content::{DynContentStore, SqliteContentStore};
use crate::social::likes::{DynLikeStore, LikeOp, LikeState, LikeTarget, SqliteLikeStore};
use crate::social::reports::{
    normalize_reason, DynReportStore, NewReport, ReportKind, ReportReceipt, ReportTarget,
    SqliteReportStore,
};
use crate::state::DbPool;

/// Longest comment excerpt stored in a notification payload
const EXCERPT_CHARS: usize = 100;

/// Knobs the service takes from configuration.
#[derive(Debug, Clone)]
pub struct SocialSettings {
    pub push_timeout: Duration,
    pub list_limit: u32,
    pub notice_senders: Vec<String>,
}

impl Default for SocialSettings {
    fn default() -> Self {
        Self {
            push_timeout: Duration::from_secs(10),
            list_limit: 50,
            notice_senders: Vec::new(),
        }
    }
}

/// Entry point for request handlers. Every operation takes the acting
/// identifier as received (auth id or profile id) and resolves it first.
pub struct SocialService {
    resolver: IdentityResolver,
    comments: DynCommentStore,
    content: DynContentStore,
    likes: DynLikeStore,
    reports: DynReportStore,
    blocks: DynBlockStore,
    preferences: DynPreferenceStore,
    devices: DynDeviceTokenStore,
    dispatcher: NotificationDispatcher,
    list_limit: u32,
    notice_senders: Vec<String>,
}

impl SocialService {
    /// Wire every store to the same SQLite pool.
    pub fn new(pool: DbPool, push: DynPushTransport, settings: SocialSettings) -> Self {
        let profiles: DynProfileStore = Arc::new(SqliteProfileStore::new(pool.clone()));
        let resolver = IdentityResolver::new(profiles);
        let preferences: DynPreferenceStore =
            Arc::new(SqlitePreferenceStore::new(pool.clone()));
        let dispatcher = NotificationDispatcher::new(
            resolver.clone(),
            Arc::new(SqliteNotificationStore::new(pool.clone())),
            preferences.clone(),
            push,
            settings.push_timeout,
        );

        Self {
            resolver,
            comments: Arc::new(SqliteCommentStore::new(pool.clone())),
            content: Arc::new(SqliteContentStore::new(pool.clone())),
            likes: Arc::new(SqliteLikeStore::new(pool.clone())),
            reports: Arc::new(SqliteReportStore::new(pool.clone())),
            blocks: Arc::new(SqliteBlockStore::new(pool.clone())),
            preferences,
            devices: Arc::new(SqliteDeviceTokenStore::new(pool)),
            dispatcher,
            list_limit: settings.list_limit,
            notice_senders: settings.notice_senders,
        }
    }

    async fn actor_payload(&self, actor: &ProfileId) -> CoreResult<NotificationPayload> {
        let profile = self
            .resolver
            .profiles()
            .get(actor)
            .await?
            .ok_or_else(|| CoreError::IdentityNotFound(actor.to_string()))?;
        Ok(NotificationPayload::actor(profile.display_name).with_avatar(profile.avatar_url))
    }

    async fn require_post(&self, post_id: &PostId) -> CoreResult<Post> {
        self.content
            .post(post_id)
            .await?
            .ok_or_else(|| CoreError::PostNotFound(post_id.to_string()))
    }

    async fn require_review(&self, review_id: &str) -> CoreResult<Review> {
        self.content
            .review(review_id)
            .await?
            .ok_or_else(|| CoreError::ReviewNotFound(review_id.to_string()))
    }

    // --- content ---

    pub async fn create_post(&self, actor: &str) -> CoreResult<Post> {
        let author = self.resolver.resolve(actor).await?;
        self.content.create_post(&author).await
    }

    pub async fn create_review(&self, actor: &str, subject: &str) -> CoreResult<Review> {
        let author = self.resolver.resolve(actor).await?;
        self.content.create_review(&author, subject).await
    }

    // --- comments ---

    /// Top-level comment. Notifies the post author.
    pub async fn comment_on_post(
        &self,
        actor: &str,
        post_id: &PostId,
        content: &str,
    ) -> CoreResult<Comment> {
        self.post_comment(actor, post_id, None, content).await
    }

    /// Reply to an existing comment. Notifies the parent's author, with the
    /// parent comment as the source.
    pub async fn reply_to_comment(
        &self,
        actor: &str,
        parent_id: &CommentId,
        content: &str,
    ) -> CoreResult<Comment> {
        let parent = self
            .comments
            .get(parent_id)
            .await?
            .ok_or_else(|| CoreError::InvalidParent(format!("{} does not exist", parent_id)))?;
        self.post_comment(actor, &parent.post_id, Some(parent_id), content)
            .await
    }

    pub async fn post_comment(
        &self,
        actor: &str,
        post_id: &PostId,
        parent_id: Option<&CommentId>,
        content: &str,
    ) -> CoreResult<Comment> {
        let author = self.resolver.resolve(actor).await?;
        let post = self.require_post(post_id).await?;

        let parent = match parent_id {
            Some(id) => Some(self.comments.get(id).await?.ok_or_else(|| {
                CoreError::InvalidParent(format!("{} does not exist", id))
            })?),
            None => None,
        };

        let comment = self
            .comments
            .create(post_id, &author, parent_id, content)
            .await?;

        let payload = self
            .actor_payload(&author)
            .await?
            .with_excerpt(truncate(&comment.content, EXCERPT_CHARS));

        match parent {
            Some(parent) => {
                self.dispatcher
                    .dispatch(
                        NotificationKind::Reply,
                        SourceRef::new(parent.id.as_str()),
                        author.as_str(),
                        payload,
                        parent.author_id.as_str(),
                    )
                    .await?;
            }
            None => {
                self.dispatcher
                    .dispatch(
                        NotificationKind::Comment,
                        SourceRef::new(post.id.as_str()),
                        author.as_str(),
                        payload,
                        &post.author_id,
                    )
                    .await?;
            }
        }

        Ok(comment)
    }

    pub async fn edit_comment(
        &self,
        actor: &str,
        comment_id: &CommentId,
        content: &str,
    ) -> CoreResult<Comment> {
        let requester = self.resolver.resolve(actor).await?;
        self.comments.edit(comment_id, &requester, content).await
    }

    pub async fn delete_comment(&self, actor: &str, comment_id: &CommentId) -> CoreResult<Comment> {
        let requester = self.resolver.resolve(actor).await?;
        self.comments.soft_delete(comment_id, &requester).await
    }

    pub async fn comment_count(&self, post_id: &PostId) -> CoreResult<u64> {
        self.comments.count_for_post(post_id).await
    }

    /// The post's comments as a forest. Comments by profiles the viewer
    /// blocked are dropped before organizing, so their replies surface as
    /// roots.
    pub async fn post_thread(
        &self,
        post_id: &PostId,
        viewer: Option<&str>,
    ) -> CoreResult<Vec<ThreadView>> {
        self.require_post(post_id).await?;
        let mut comments = self.comments.list_for_post(post_id).await?;

        if let Some(viewer) = viewer {
            let viewer = self.resolver.resolve(viewer).await?;
            let blocked: HashSet<ProfileId> =
                self.blocks.blocked_by(&viewer).await?.into_iter().collect();
            if !blocked.is_empty() {
                comments.retain(|c| !blocked.contains(&c.author_id));
            }
        }

        Ok(organize(comments).to_view())
    }

    // --- likes ---

    pub async fn like_post(&self, actor: &str, post_id: &PostId) -> CoreResult<LikeState> {
        self.change_post_like(actor, post_id, LikeOp::Like).await
    }

    pub async fn unlike_post(&self, actor: &str, post_id: &PostId) -> CoreResult<LikeState> {
        self.change_post_like(actor, post_id, LikeOp::Unlike).await
    }

    pub async fn toggle_post_like(&self, actor: &str, post_id: &PostId) -> CoreResult<LikeState> {
        self.change_post_like(actor, post_id, LikeOp::Toggle).await
    }

    async fn change_post_like(
        &self,
        actor: &str,
        post_id: &PostId,
        op: LikeOp,
    ) -> CoreResult<LikeState> {
        let liker = self.resolver.resolve(actor).await?;
        let post = self.require_post(post_id).await?;
        let notice = NewNotification {
            kind: NotificationKind::Like,
            source_ref: SourceRef::new(post.id.as_str()),
            from_profile_id: liker.clone(),
            to_profile_id: ProfileId::new(post.author_id.as_str()),
            payload: self.actor_payload(&liker).await?,
        };
        self.apply_like(LikeTarget::Post, post_id.as_str(), &liker, op, notice)
            .await
    }

    pub async fn like_review(&self, actor: &str, review_id: &str) -> CoreResult<LikeState> {
        self.change_review_like(actor, review_id, LikeOp::Like).await
    }

    pub async fn unlike_review(&self, actor: &str, review_id: &str) -> CoreResult<LikeState> {
        self.change_review_like(actor, review_id, LikeOp::Unlike).await
    }

    pub async fn toggle_review_like(&self, actor: &str, review_id: &str) -> CoreResult<LikeState> {
        self.change_review_like(actor, review_id, LikeOp::Toggle).await
    }

    async fn change_review_like(
        &self,
        actor: &str,
        review_id: &str,
        op: LikeOp,
    ) -> CoreResult<LikeState> {
        let liker = self.resolver.resolve(actor).await?;
        let review = self.require_review(review_id).await?;
        let notice = NewNotification {
            kind: NotificationKind::ReviewLike,
            source_ref: SourceRef::new(review.id.as_str()),
            from_profile_id: liker.clone(),
            to_profile_id: ProfileId::new(review.author_id.as_str()),
            payload: self
                .actor_payload(&liker)
                .await?
                .with_subject(review.subject.as_str()),
        };
        self.apply_like(LikeTarget::Review, review_id, &liker, op, notice)
            .await
    }

    /// Write the like and its notification together, then push after commit.
    async fn apply_like(
        &self,
        target: LikeTarget,
        id: &str,
        liker: &ProfileId,
        op: LikeOp,
        notice: NewNotification,
    ) -> CoreResult<LikeState> {
        let notice = (!notice.is_self_addressed()).then_some(notice);
        let change = self
            .likes
            .apply(target, id, liker, op, notice.as_ref())
            .await?;
        if let Some(notification) = &change.created {
            self.dispatcher.announce(notification).await;
        }
        Ok(change.state)
    }

    // --- reports and blocks ---

    /// Always `Accepted`, whether or not the reporter already reported the
    /// target.
    pub async fn submit_report(
        &self,
        actor: &str,
        target: ReportTarget,
        target_id: &str,
        kind: ReportKind,
        reason: &str,
    ) -> CoreResult<ReportReceipt> {
        let reporter = self.resolver.resolve(actor).await?;
        let reason = normalize_reason(reason)?;

        let post_id = match target {
            ReportTarget::Post => Some(target_id.to_string()),
            ReportTarget::Comment => self
                .comments
                .get(&CommentId::new(target_id))
                .await?
                .map(|c| c.post_id.0),
            ReportTarget::Profile => None,
        };

        let report = NewReport {
            reporter,
            target,
            target_id: target_id.to_string(),
            post_id,
            kind,
            reason,
        };
        match self.reports.insert(&report).await {
            Ok(id) => {
                tracing::info!(
                    "Report {} filed against {} {}",
                    id,
                    target.as_str(),
                    target_id
                );
            }
            Err(CoreError::DuplicateSubmission) => {
                tracing::debug!(
                    "Repeated report by {} on {} {} absorbed",
                    report.reporter,
                    target.as_str(),
                    target_id
                );
            }
            Err(e) => return Err(e),
        }
        Ok(ReportReceipt::Accepted)
    }

    pub async fn block(&self, actor: &str, target: &str) -> CoreResult<bool> {
        let blocker = self.resolver.resolve(actor).await?;
        let blocked = self.resolver.resolve(target).await?;
        self.blocks.block(&blocker, &blocked).await
    }

    pub async fn unblock(&self, actor: &str, target: &str) -> CoreResult<bool> {
        let blocker = self.resolver.resolve(actor).await?;
        let blocked = self.resolver.resolve(target).await?;
        self.blocks.unblock(&blocker, &blocked).await
    }

    pub async fn blocked_profiles(&self, actor: &str) -> CoreResult<Vec<ProfileId>> {
        let blocker = self.resolver.resolve(actor).await?;
        self.blocks.blocked_by(&blocker).await
    }

    // --- notifications ---

    pub async fn notifications(
        &self,
        actor: &str,
        limit: Option<u32>,
    ) -> CoreResult<Vec<Notification>> {
        let recipient = self.resolver.resolve(actor).await?;
        let limit = limit.unwrap_or(self.list_limit).min(self.list_limit);
        self.dispatcher.list(&recipient, limit).await
    }

    pub async fn unread_count(&self, actor: &str) -> CoreResult<u64> {
        let recipient = self.resolver.resolve(actor).await?;
        self.dispatcher.unread_count(&recipient).await
    }

    pub async fn mark_read(&self, actor: &str, notification_id: &str) -> CoreResult<bool> {
        let recipient = self.resolver.resolve(actor).await?;
        self.dispatcher.mark_read(notification_id, &recipient).await
    }

    pub async fn mark_all_read(&self, actor: &str) -> CoreResult<usize> {
        let recipient = self.resolver.resolve(actor).await?;
        self.dispatcher.mark_all_read(&recipient).await
    }

    pub async fn preferences(&self, actor: &str) -> CoreResult<NotificationPreferences> {
        let profile = self.resolver.resolve(actor).await?;
        self.preferences.get(&profile).await
    }

    pub async fn update_preferences(
        &self,
        actor: &str,
        prefs: &NotificationPreferences,
    ) -> CoreResult<NotificationPreferences> {
        let profile = self.resolver.resolve(actor).await?;
        self.preferences.save(&profile, prefs).await?;
        Ok(*prefs)
    }

    pub async fn register_device(
        &self,
        actor: &str,
        token: &str,
        platform: &str,
    ) -> CoreResult<DeviceToken> {
        let profile = self.resolver.resolve(actor).await?;
        let token = token.trim();
        if token.is_empty() {
            return Err(CoreError::InvalidInput(
                "Device token must not be empty".to_string(),
            ));
        }
        Ok(self.devices.register(&profile, token, platform).await?)
    }

    pub async fn broadcast_notice(
        &self,
        actor: &str,
        title: &str,
        body: &str,
    ) -> CoreResult<NoticeBroadcast> {
        let title = title.trim();
        if title.is_empty() {
            return Err(CoreError::InvalidInput(
                "Notice title must not be empty".to_string(),
            ));
        }
        self.dispatcher.broadcast_notice(actor, title, body.trim()).await
    }

    /// Whether the actor is one of the configured notice senders. Entries may
    /// name either identifier of a profile.
    pub async fn may_broadcast(&self, actor: &str) -> CoreResult<bool> {
        let profile = self.resolver.resolve(actor).await?;
        for sender in &self.notice_senders {
            match self.resolver.resolve(sender).await {
                Ok(id) if id == profile => return Ok(true),
                Ok(_) => {}
                Err(CoreError::IdentityNotFound(_)) => {
                    tracing::warn!("Configured notice sender {} has no profile", sender);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    pub fn push_stats(&self) -> PushStats {
        self.dispatcher.push_stats()
    }
}
