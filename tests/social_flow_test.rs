use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use usapan::comments::{PostId, TOMBSTONE};
use usapan::db;
use usapan::db::models::Profile;
use usapan::error::CoreError;
use usapan::identity::{AuthId, ProfileId, ProfileStore, SqliteProfileStore};
use usapan::notifications::{Notification, NotificationKind};
use usapan::preferences::NotificationPreferences;
use usapan::push::{DeliveryOutcome, PushError, PushMessage, PushTransport};
use usapan::social::{ReportKind, ReportReceipt, ReportTarget, SocialService, SocialSettings};
use usapan::state::DbPool;

/// Forwards every push into a channel so tests can observe delivery.
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

struct World {
    social: SocialService,
    pool: DbPool,
    pushes: mpsc::UnboundedReceiver<(ProfileId, PushMessage)>,
    a: Profile,
    b: Profile,
    post: PostId,
    _tmp: TempDir,
}

/// Profile A (auth id "auth-a") and profile B (auth id "auth-b"), with a
/// post P authored by B.
async fn world() -> World {
    let tmp = TempDir::new().unwrap();
    let pool = db::create_pool(&tmp.path().join("test.db"), 4).unwrap();
    db::run_migrations(&pool).unwrap();

    let profiles = SqliteProfileStore::new(pool.clone());
    let a = profiles
        .create(Some(&AuthId::new("auth-a")), "Ana", None)
        .await
        .unwrap();
    let b = profiles
        .create(Some(&AuthId::new("auth-b")), "Ben", None)
        .await
        .unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let social = SocialService::new(
        pool.clone(),
        Arc::new(RecordingTransport { tx }),
        SocialSettings::default(),
    );
    let post = social.create_post("auth-b").await.unwrap();

    World {
        social,
        pool,
        pushes: rx,
        a,
        b,
        post: PostId::new(post.id),
        _tmp: tmp,
    }
}

fn notifications_of(pool: &DbPool, kind: NotificationKind) -> i64 {
    let conn = pool.get().unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE type = ?1",
        [kind.as_str()],
        |row| row.get(0),
    )
    .unwrap()
}

async fn only_notification_for(w: &World, identifier: &str) -> Notification {
    let mut listed = w.social.notifications(identifier, None).await.unwrap();
    assert_eq!(listed.len(), 1, "expected exactly one notification");
    listed.remove(0)
}

#[tokio::test]
async fn comment_notifies_post_author() {
    let mut w = world().await;

    w.social
        .comment_on_post("auth-a", &w.post, "Lovely photo")
        .await
        .unwrap();

    let n = only_notification_for(&w, "auth-b").await;
    assert_eq!(n.kind, NotificationKind::Comment);
    assert_eq!(n.from_profile_id.as_str(), w.a.id);
    assert_eq!(n.to_profile_id.as_str(), w.b.id);
    assert_eq!(n.source_ref.as_str(), w.post.as_str());
    assert_eq!(n.payload.excerpt.as_deref(), Some("Lovely photo"));

    let (recipient, message) = tokio::time::timeout(Duration::from_secs(2), w.pushes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recipient.as_str(), w.b.id);
    assert_eq!(message.body, "Ana commented on your post.");
}

#[tokio::test]
async fn reply_notifies_parent_author_with_parent_as_source() {
    let w = world().await;

    let c1 = w
        .social
        .comment_on_post("auth-b", &w.post, "First!")
        .await
        .unwrap();
    // B commenting on B's own post notifies nobody
    assert_eq!(notifications_of(&w.pool, NotificationKind::Comment), 0);

    w.social
        .reply_to_comment("auth-a", &c1.id, "Agreed")
        .await
        .unwrap();

    let n = only_notification_for(&w, &w.b.id).await;
    assert_eq!(n.kind, NotificationKind::Reply);
    assert_eq!(n.source_ref.as_str(), c1.id.as_str());
    assert_eq!(n.from_profile_id.as_str(), w.a.id);
    assert_eq!(n.to_profile_id.as_str(), w.b.id);
}

#[tokio::test]
async fn like_then_unlike_leaves_no_like_notification() {
    let w = world().await;

    let liked = w.social.like_post("auth-a", &w.post).await.unwrap();
    assert!(liked.liked);
    assert_eq!(liked.like_count, 1);
    assert_eq!(notifications_of(&w.pool, NotificationKind::Like), 1);

    let unliked = w.social.unlike_post("auth-a", &w.post).await.unwrap();
    assert!(!unliked.liked);
    assert_eq!(unliked.like_count, 0);
    assert_eq!(notifications_of(&w.pool, NotificationKind::Like), 0);
}

#[tokio::test]
async fn repeated_likes_converge() {
    let w = world().await;

    w.social.like_post("auth-a", &w.post).await.unwrap();
    w.social.like_post(&w.a.id, &w.post).await.unwrap();
    assert_eq!(notifications_of(&w.pool, NotificationKind::Like), 1);

    // Two toggles in a row land back where they started
    w.social.toggle_post_like("auth-a", &w.post).await.unwrap();
    let state = w.social.toggle_post_like("auth-a", &w.post).await.unwrap();
    assert!(state.liked);
    assert_eq!(state.like_count, 1);
    assert_eq!(notifications_of(&w.pool, NotificationKind::Like), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_toggles_keep_like_and_notification_in_step() {
    let w = world().await;
    let social = Arc::new(w.social);
    let post = w.post.clone();
    let mut expect_liked = false;

    for round in 0..150 {
        // Alternate odd and even batches so both end states get exercised
        let batch = 7 + round % 2;
        let mut handles = Vec::new();
        for _ in 0..batch {
            let social = social.clone();
            let post = post.clone();
            handles.push(tokio::spawn(async move {
                social.toggle_post_like("auth-a", &post).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        if batch % 2 == 1 {
            expect_liked = !expect_liked;
        }

        let likes: i64 = w
            .pool
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM post_likes", [], |row| row.get(0))
            .unwrap();
        let notified = notifications_of(&w.pool, NotificationKind::Like);
        assert_eq!(likes, i64::from(expect_liked), "round {}", round);
        assert_eq!(notified, likes, "round {}: like and notification diverged", round);
    }
}

#[tokio::test]
async fn duplicate_report_is_accepted_silently() {
    let w = world().await;

    let first = w
        .social
        .submit_report(
            "auth-a",
            ReportTarget::Post,
            w.post.as_str(),
            ReportKind::Spam,
            "Advertising",
        )
        .await
        .unwrap();
    let second = w
        .social
        .submit_report(
            "auth-a",
            ReportTarget::Post,
            w.post.as_str(),
            ReportKind::Harassment,
            "Actually it is rude",
        )
        .await
        .unwrap();

    assert_eq!(first, ReportReceipt::Accepted);
    assert_eq!(second, ReportReceipt::Accepted);

    let conn = w.pool.get().unwrap();
    let reports: i64 = conn
        .query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))
        .unwrap();
    assert_eq!(reports, 1);
}

#[tokio::test]
async fn soft_delete_keeps_thread_shape() {
    let w = world().await;

    let root = w
        .social
        .comment_on_post("auth-b", &w.post, "Root")
        .await
        .unwrap();
    let mid = w
        .social
        .reply_to_comment("auth-a", &root.id, "Mid")
        .await
        .unwrap();
    w.social
        .reply_to_comment("auth-b", &mid.id, "Leaf")
        .await
        .unwrap();

    let deleted = w.social.delete_comment("auth-a", &mid.id).await.unwrap();
    assert!(deleted.is_deleted);
    assert_eq!(deleted.content, TOMBSTONE);

    let thread = w.social.post_thread(&w.post, None).await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].total_replies, 2);
    let mid_view = &thread[0].replies[0];
    assert_eq!(mid_view.comment.id, mid.id);
    assert!(mid_view.comment.is_deleted);
    assert_eq!(mid_view.replies.len(), 1);
    assert_eq!(mid_view.replies[0].comment.content, "Leaf");

    assert_eq!(w.social.comment_count(&w.post).await.unwrap(), 3);
}

#[tokio::test]
async fn only_the_author_may_edit_or_delete() {
    let w = world().await;
    let comment = w
        .social
        .comment_on_post("auth-a", &w.post, "Mine")
        .await
        .unwrap();

    let err = w
        .social
        .edit_comment("auth-b", &comment.id, "Hijacked")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied));
    let err = w
        .social
        .delete_comment("auth-b", &comment.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied));

    // The author can use either identifier
    let edited = w
        .social
        .edit_comment(&w.a.id, &comment.id, "Mine, edited")
        .await
        .unwrap();
    assert!(edited.is_edited);
    assert_eq!(edited.content, "Mine, edited");
}

#[tokio::test]
async fn disabled_category_stores_row_but_skips_push() {
    let mut w = world().await;
    w.social
        .update_preferences(
            "auth-b",
            &NotificationPreferences {
                comment: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    w.social
        .comment_on_post("auth-a", &w.post, "Quiet please")
        .await
        .unwrap();
    assert_eq!(notifications_of(&w.pool, NotificationKind::Comment), 1);

    let pushed = tokio::time::timeout(Duration::from_millis(200), w.pushes.recv()).await;
    assert!(pushed.is_err(), "push should not be attempted");
}

#[tokio::test]
async fn read_state_and_unread_count() {
    let w = world().await;
    w.social.like_post("auth-a", &w.post).await.unwrap();
    w.social
        .comment_on_post("auth-a", &w.post, "Hello")
        .await
        .unwrap();
    w.social
        .broadcast_notice(&w.a.id, "Welcome", "Thanks for joining")
        .await
        .unwrap();

    // Notices are listed but not counted
    assert_eq!(w.social.notifications("auth-b", None).await.unwrap().len(), 3);
    assert_eq!(w.social.unread_count("auth-b").await.unwrap(), 2);

    let first = w.social.notifications("auth-b", None).await.unwrap()[0].clone();
    // Another profile cannot mark B's notification
    assert!(!w.social.mark_read("auth-a", &first.id).await.unwrap());
    assert!(w.social.mark_read("auth-b", &first.id).await.unwrap());

    w.social.mark_all_read("auth-b").await.unwrap();
    assert_eq!(w.social.unread_count("auth-b").await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_actor_is_identity_not_found() {
    let w = world().await;
    let err = w
        .social
        .comment_on_post("stranger", &w.post, "Hi")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::IdentityNotFound(_)));
    assert_eq!(w.social.comment_count(&w.post).await.unwrap(), 0);
}
