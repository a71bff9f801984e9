use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreResult;
use crate::identity::{IdentityResolver, ProfileId};
use crate::notifications::dedup::{DedupGuard, Reservation};
use crate::notifications::domain::{
    NewNotification, Notification, NotificationKind, NotificationPayload, SourceRef,
};
use crate::notifications::repository::DynNotificationStore;
use crate::preferences::DynPreferenceStore;
use crate::push::{DynPushTransport, PushMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SelfNotification,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Created {
        notification: Notification,
        /// False when the recipient opted out of this category
        push_scheduled: bool,
    },
    Skipped(SkipReason),
}

impl DispatchOutcome {
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            Self::Created { notification, .. } => Some(notification),
            Self::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// A broadcast is not atomic: `failed` counts recipients whose row could not
/// be written while the rest were delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoticeBroadcast {
    pub notice_id: String,
    pub recipients: usize,
    pub failed: usize,
}

/// Cumulative push counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushStats {
    pub attempted: u64,
    pub sent: u64,
    pub failed: u64,
    pub timeouts: u64,
}

#[derive(Default)]
struct PushCounters {
    attempted: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
}

impl PushCounters {
    fn snapshot(&self) -> PushStats {
        PushStats {
            attempted: self.attempted.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Resolves identities, guards against self and duplicate notifications,
/// persists, then hands push delivery to a background task.
#[derive(Clone)]
pub struct NotificationDispatcher {
    resolver: IdentityResolver,
    store: DynNotificationStore,
    dedup: DedupGuard,
    preferences: DynPreferenceStore,
    push: DynPushTransport,
    push_timeout: Duration,
    counters: Arc<PushCounters>,
}

impl NotificationDispatcher {
    pub fn new(
        resolver: IdentityResolver,
        store: DynNotificationStore,
        preferences: DynPreferenceStore,
        push: DynPushTransport,
        push_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            dedup: DedupGuard::new(store.clone()),
            store,
            preferences,
            push,
            push_timeout,
            counters: Arc::new(PushCounters::default()),
        }
    }

    pub async fn dispatch(
        &self,
        kind: NotificationKind,
        source_ref: SourceRef,
        from_identifier: &str,
        payload: NotificationPayload,
        to_identifier: &str,
    ) -> CoreResult<DispatchOutcome> {
        let from = self.resolver.resolve(from_identifier).await?;
        let to = self.resolver.resolve(to_identifier).await?;

        self.deliver(NewNotification {
            kind,
            source_ref,
            from_profile_id: from,
            to_profile_id: to,
            payload,
        })
        .await
    }

    async fn deliver(&self, new: NewNotification) -> CoreResult<DispatchOutcome> {
        if new.is_self_addressed() {
            tracing::debug!(
                "Skipping {} notification to self for {}",
                new.kind,
                new.from_profile_id
            );
            return Ok(DispatchOutcome::Skipped(SkipReason::SelfNotification));
        }

        let notification = match self.dedup.check_and_reserve(&new).await? {
            Reservation::Reserved(notification) => notification,
            Reservation::AlreadyExists => {
                return Ok(DispatchOutcome::Skipped(SkipReason::Duplicate));
            }
        };

        let push_scheduled = self.announce(&notification).await;
        Ok(DispatchOutcome::Created {
            notification,
            push_scheduled,
        })
    }

    /// Push a committed notification unless the recipient opted out of its
    /// category. Callers that write the row inside their own transaction
    /// call this after commit. Returns whether a push was scheduled.
    pub async fn announce(&self, notification: &Notification) -> bool {
        if self.push_allowed(notification).await {
            self.schedule_push(notification);
            true
        } else {
            tracing::debug!(
                "{} disabled {} notifications, skipping push",
                notification.to_profile_id,
                notification.kind.category().as_str()
            );
            false
        }
    }

    async fn push_allowed(&self, notification: &Notification) -> bool {
        if notification.kind.is_notice() {
            return true;
        }
        match self.preferences.get(&notification.to_profile_id).await {
            Ok(prefs) => prefs.allows(notification.kind.category()),
            Err(e) => {
                // The row is already committed; default to the opt-in state
                tracing::warn!(
                    "Failed to read notification preferences for {}: {}",
                    notification.to_profile_id,
                    e
                );
                true
            }
        }
    }

    fn schedule_push(&self, notification: &Notification) {
        let message = PushMessage::for_notification(notification);
        let recipient = notification.to_profile_id.clone();
        let push = self.push.clone();
        let counters = self.counters.clone();
        let timeout = self.push_timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, push.send(&recipient, &message)).await {
                Ok(Ok(outcome)) => {
                    counters
                        .attempted
                        .fetch_add(outcome.attempted as u64, Ordering::Relaxed);
                    counters
                        .sent
                        .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
                    counters
                        .failed
                        .fetch_add(outcome.failed() as u64, Ordering::Relaxed);
                    tracing::debug!(
                        "Push to {}: {}/{} delivered",
                        recipient,
                        outcome.delivered,
                        outcome.attempted
                    );
                }
                Ok(Err(e)) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Push to {} failed: {}", recipient, e);
                }
                Err(_) => {
                    counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Push to {} timed out after {:?}", recipient, timeout);
                }
            }
        });
    }

    /// Delete every notification for the tuple. Missing rows are not an error.
    pub async fn revoke(
        &self,
        kind: NotificationKind,
        source_ref: &SourceRef,
        from_identifier: &str,
        to_identifier: &str,
    ) -> CoreResult<usize> {
        let from = self.resolver.resolve(from_identifier).await?;
        let to = self.resolver.resolve(to_identifier).await?;

        let removed = self
            .store
            .delete_matching(kind, source_ref, &from, &to)
            .await?;
        if removed > 0 {
            tracing::debug!(
                "Revoked {} {} notification(s) from {} to {}",
                removed,
                kind,
                from,
                to
            );
        }
        Ok(removed)
    }

    /// Send a notice to every profile, the sender included.
    pub async fn broadcast_notice(
        &self,
        from_identifier: &str,
        title: &str,
        body: &str,
    ) -> CoreResult<NoticeBroadcast> {
        let from = self.resolver.resolve(from_identifier).await?;
        let sender = self.resolver.profiles().get(&from).await?;
        let payload = NotificationPayload {
            actor_name: sender
                .as_ref()
                .map(|p| p.display_name.clone())
                .unwrap_or_default(),
            actor_avatar: sender.and_then(|p| p.avatar_url),
            excerpt: Some(body.to_string()),
            subject: Some(title.to_string()),
        };

        let notice_id = uuid::Uuid::now_v7().to_string();
        let mut recipients = 0;
        let mut failed = 0;
        for to in self.resolver.profiles().list_ids().await? {
            let outcome = self
                .deliver(NewNotification {
                    kind: NotificationKind::Notice,
                    source_ref: SourceRef::new(notice_id.clone()),
                    from_profile_id: from.clone(),
                    to_profile_id: to.clone(),
                    payload: payload.clone(),
                })
                .await;
            match outcome {
                Ok(outcome) if !outcome.is_skipped() => recipients += 1,
                Ok(_) => {}
                Err(e) => {
                    failed += 1;
                    tracing::warn!("Notice {} to {} failed: {}", notice_id, to, e);
                }
            }
        }

        if failed > 0 {
            tracing::warn!(
                "Notice {} sent to {} profile(s), {} failed",
                notice_id,
                recipients,
                failed
            );
        } else {
            tracing::info!("Notice {} sent to {} profile(s)", notice_id, recipients);
        }
        Ok(NoticeBroadcast {
            notice_id,
            recipients,
            failed,
        })
    }

    pub async fn list(&self, recipient: &ProfileId, limit: u32) -> CoreResult<Vec<Notification>> {
        self.store.list_for_recipient(recipient, limit).await
    }

    pub async fn mark_read(&self, id: &str, recipient: &ProfileId) -> CoreResult<bool> {
        self.store.mark_read(id, recipient).await
    }

    pub async fn mark_all_read(&self, recipient: &ProfileId) -> CoreResult<usize> {
        self.store.mark_all_read(recipient).await
    }

    pub async fn unread_count(&self, recipient: &ProfileId) -> CoreResult<u64> {
        self.store.unread_count(recipient).await
    }

    pub fn push_stats(&self) -> PushStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_profile, test_pool};
    use crate::error::CoreError;
    use crate::identity::SqliteProfileStore;
    use crate::notifications::repository::{NotificationStore, SqliteNotificationStore};
    use crate::preferences::{NotificationPreferences, PreferenceStore, SqlitePreferenceStore};
    use crate::push::{DeliveryOutcome, PushError, PushTransport};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct RecordingTransport {
        tx: mpsc::UnboundedSender<(ProfileId, PushMessage)>,
    }

    #[async_trait]
    impl PushTransport for RecordingTransport {
        async fn send(
            &self,
            recipient: &ProfileId,
            message: &PushMessage,
        ) -> Result<DeliveryOutcome, PushError> {
            let _ = self.tx.send((recipient.clone(), message.clone()));
            Ok(DeliveryOutcome {
                attempted: 1,
                delivered: 1,
                ..Default::default()
            })
        }
    }

    struct SlowTransport;

    #[async_trait]
    impl PushTransport for SlowTransport {
        async fn send(
            &self,
            _recipient: &ProfileId,
            _message: &PushMessage,
        ) -> Result<DeliveryOutcome, PushError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(DeliveryOutcome::default())
        }
    }

    struct Harness {
        dispatcher: NotificationDispatcher,
        prefs: Arc<SqlitePreferenceStore>,
        pushes: mpsc::UnboundedReceiver<(ProfileId, PushMessage)>,
        pool: crate::state::DbPool,
        _tmp: tempfile::TempDir,
    }

    fn harness_with(push: Option<DynPushTransport>, timeout: Duration) -> Harness {
        let (pool, tmp) = test_pool();
        insert_profile(&pool, "profile-ana", Some("auth-ana"), "Ana");
        insert_profile(&pool, "profile-ben", Some("auth-ben"), "Ben");
        insert_profile(&pool, "profile-cho", None, "Cho");

        let (tx, rx) = mpsc::unbounded_channel();
        let push =
            push.unwrap_or_else(|| Arc::new(RecordingTransport { tx }) as DynPushTransport);
        let prefs = Arc::new(SqlitePreferenceStore::new(pool.clone()));
        let dispatcher = NotificationDispatcher::new(
            IdentityResolver::new(Arc::new(SqliteProfileStore::new(pool.clone()))),
            Arc::new(SqliteNotificationStore::new(pool.clone())),
            prefs.clone(),
            push,
            timeout,
        );
        Harness {
            dispatcher,
            prefs,
            pushes: rx,
            pool,
            _tmp: tmp,
        }
    }

    fn harness() -> Harness {
        harness_with(None, Duration::from_secs(5))
    }

    fn notification_rows(pool: &crate::state::DbPool) -> i64 {
        let conn = pool.get().unwrap();
        conn.query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
            .unwrap()
    }

    async fn like(h: &Harness, from: &str, to: &str) -> DispatchOutcome {
        h.dispatcher
            .dispatch(
                NotificationKind::Like,
                SourceRef::new("post-1"),
                from,
                NotificationPayload::actor("Ana"),
                to,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn dispatch_persists_and_pushes() {
        let mut h = harness();
        let outcome = like(&h, "auth-ana", "profile-ben").await;

        let notification = outcome.notification().unwrap();
        assert_eq!(notification.from_profile_id, ProfileId::new("profile-ana"));
        assert_eq!(notification.to_profile_id, ProfileId::new("profile-ben"));
        assert!(matches!(
            outcome,
            DispatchOutcome::Created {
                push_scheduled: true,
                ..
            }
        ));

        let (recipient, message) = tokio::time::timeout(Duration::from_secs(2), h.pushes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recipient, ProfileId::new("profile-ben"));
        assert_eq!(message.title, "New like");
        assert_eq!(message.channel_id, "post");
    }

    #[tokio::test]
    async fn self_notification_is_skipped_without_row() {
        let h = harness();
        // Same profile reached through both identifier kinds
        let outcome = like(&h, "auth-ana", "profile-ana").await;
        assert_eq!(outcome, DispatchOutcome::Skipped(SkipReason::SelfNotification));
        assert_eq!(notification_rows(&h.pool), 0);
    }

    #[tokio::test]
    async fn duplicate_dispatch_yields_one_row() {
        let h = harness();
        assert!(!like(&h, "auth-ana", "auth-ben").await.is_skipped());
        let second = like(&h, "profile-ana", "profile-ben").await;
        assert_eq!(second, DispatchOutcome::Skipped(SkipReason::Duplicate));
        assert_eq!(notification_rows(&h.pool), 1);
    }

    #[tokio::test]
    async fn unknown_identity_fails_without_writes() {
        let h = harness();
        let err = h
            .dispatcher
            .dispatch(
                NotificationKind::Comment,
                SourceRef::new("post-1"),
                "auth-ana",
                NotificationPayload::actor("Ana"),
                "ghost",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::IdentityNotFound(_)));
        assert_eq!(notification_rows(&h.pool), 0);
    }

    #[tokio::test]
    async fn revoke_removes_the_tuple() {
        let h = harness();
        like(&h, "auth-ana", "profile-ben").await;
        let removed = h
            .dispatcher
            .revoke(
                NotificationKind::Like,
                &SourceRef::new("post-1"),
                "profile-ana",
                "auth-ben",
            )
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(notification_rows(&h.pool), 0);

        // Revoking again is a no-op
        let removed = h
            .dispatcher
            .revoke(
                NotificationKind::Like,
                &SourceRef::new("post-1"),
                "profile-ana",
                "profile-ben",
            )
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn disabled_preference_persists_without_push() {
        let mut h = harness();
        h.prefs
            .save(
                &ProfileId::new("profile-ben"),
                &NotificationPreferences {
                    post: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let outcome = like(&h, "auth-ana", "profile-ben").await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Created {
                push_scheduled: false,
                ..
            }
        ));
        assert_eq!(notification_rows(&h.pool), 1);

        let nothing = tokio::time::timeout(Duration::from_millis(200), h.pushes.recv()).await;
        assert!(nothing.is_err(), "no push expected");
    }

    #[tokio::test]
    async fn notice_bypasses_self_guard_and_preferences() {
        let mut h = harness();
        for id in ["profile-ana", "profile-ben", "profile-cho"] {
            h.prefs
                .save(
                    &ProfileId::new(id),
                    &NotificationPreferences {
                        notice: false,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let broadcast = h
            .dispatcher
            .broadcast_notice("auth-ana", "Maintenance", "Back at 9.")
            .await
            .unwrap();
        assert_eq!(broadcast.recipients, 3);
        assert_eq!(notification_rows(&h.pool), 3);

        let mut pushed = Vec::new();
        for _ in 0..3 {
            let (recipient, message) =
                tokio::time::timeout(Duration::from_secs(2), h.pushes.recv())
                    .await
                    .unwrap()
                    .unwrap();
            assert_eq!(message.title, "Maintenance");
            assert_eq!(message.body, "Back at 9.");
            pushed.push(recipient);
        }
        pushed.sort();
        assert_eq!(
            pushed,
            vec![
                ProfileId::new("profile-ana"),
                ProfileId::new("profile-ben"),
                ProfileId::new("profile-cho")
            ]
        );

        // Notices do not count as unread activity
        assert_eq!(
            h.dispatcher
                .unread_count(&ProfileId::new("profile-ben"))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn slow_push_times_out_without_blocking_dispatch() {
        let h = harness_with(Some(Arc::new(SlowTransport)), Duration::from_millis(50));
        let started = std::time::Instant::now();
        let outcome = like(&h, "auth-ana", "profile-ben").await;
        assert!(!outcome.is_skipped());
        assert!(started.elapsed() < Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(h.dispatcher.push_stats().timeouts, 1);
        assert_eq!(notification_rows(&h.pool), 1);
    }

    #[tokio::test]
    async fn push_stats_accumulate() {
        let mut h = harness();
        like(&h, "auth-ana", "profile-ben").await;
        h.pushes.recv().await.unwrap();
        // Counters update after the transport returns
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stats = h.dispatcher.push_stats();
        assert_eq!(stats.attempted, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 0);
    }

    /// Fails every insert addressed to one profile.
    struct RefusesRecipient {
        inner: SqliteNotificationStore,
        refused: ProfileId,
    }

    #[async_trait]
    impl NotificationStore for RefusesRecipient {
        async fn insert_if_absent(
            &self,
            new: &NewNotification,
        ) -> CoreResult<Option<Notification>> {
            if new.to_profile_id == self.refused {
                return Err(CoreError::Database(rusqlite::Error::QueryReturnedNoRows));
            }
            self.inner.insert_if_absent(new).await
        }

        async fn delete_matching(
            &self,
            kind: NotificationKind,
            source_ref: &SourceRef,
            from: &ProfileId,
            to: &ProfileId,
        ) -> CoreResult<usize> {
            self.inner.delete_matching(kind, source_ref, from, to).await
        }

        async fn get(&self, id: &str) -> CoreResult<Option<Notification>> {
            self.inner.get(id).await
        }

        async fn list_for_recipient(
            &self,
            recipient: &ProfileId,
            limit: u32,
        ) -> CoreResult<Vec<Notification>> {
            self.inner.list_for_recipient(recipient, limit).await
        }

        async fn mark_read(&self, id: &str, recipient: &ProfileId) -> CoreResult<bool> {
            self.inner.mark_read(id, recipient).await
        }

        async fn mark_all_read(&self, recipient: &ProfileId) -> CoreResult<usize> {
            self.inner.mark_all_read(recipient).await
        }

        async fn unread_count(&self, recipient: &ProfileId) -> CoreResult<u64> {
            self.inner.unread_count(recipient).await
        }
    }

    #[tokio::test]
    async fn broadcast_reports_recipients_that_failed() {
        let h = harness();
        let dispatcher = NotificationDispatcher::new(
            IdentityResolver::new(Arc::new(SqliteProfileStore::new(h.pool.clone()))),
            Arc::new(RefusesRecipient {
                inner: SqliteNotificationStore::new(h.pool.clone()),
                refused: ProfileId::new("profile-ben"),
            }),
            h.prefs.clone(),
            Arc::new(crate::push::NoopPushTransport),
            Duration::from_secs(1),
        );

        let broadcast = dispatcher
            .broadcast_notice("auth-ana", "Maintenance", "Back at 9.")
            .await
            .unwrap();
        assert_eq!(broadcast.recipients, 2);
        assert_eq!(broadcast.failed, 1);
        assert_eq!(notification_rows(&h.pool), 2);
    }

    #[tokio::test]
    async fn announce_respects_preferences_for_committed_rows() {
        let mut h = harness();
        let new = NewNotification {
            kind: NotificationKind::ReviewLike,
            source_ref: SourceRef::new("review-1"),
            from_profile_id: ProfileId::new("profile-ana"),
            to_profile_id: ProfileId::new("profile-ben"),
            payload: NotificationPayload::actor("Ana"),
        };
        let conn = h.pool.get().unwrap();
        let notification = crate::notifications::repository::insert_if_absent_on(&conn, &new)
            .unwrap()
            .unwrap();
        drop(conn);

        assert!(h.dispatcher.announce(&notification).await);
        let (recipient, _) = tokio::time::timeout(Duration::from_secs(2), h.pushes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recipient, ProfileId::new("profile-ben"));

        h.prefs
            .save(
                &ProfileId::new("profile-ben"),
                &NotificationPreferences {
                    review: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!h.dispatcher.announce(&notification).await);
    }
}
