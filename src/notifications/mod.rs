pub mod dedup;
pub mod dispatcher;
pub mod domain;
pub mod repository;

pub use dedup::{DedupGuard, DedupKey, Reservation};
pub use dispatcher::{
    DispatchOutcome, NoticeBroadcast, NotificationDispatcher, PushStats, SkipReason,
};
pub use domain::{NewNotification, Notification, NotificationKind, NotificationPayload, SourceRef};
pub use repository::{DynNotificationStore, NotificationStore, SqliteNotificationStore};
