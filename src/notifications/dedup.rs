use crate::error::CoreResult;
use crate::identity::ProfileId;
use crate::notifications::domain::{NewNotification, Notification, NotificationKind, SourceRef};
use crate::notifications::repository::DynNotificationStore;

/// The tuple that may hold at most one unread notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub kind: NotificationKind,
    pub source_ref: SourceRef,
    pub from: ProfileId,
    pub to: ProfileId,
}

impl DedupKey {
    pub fn of(new: &NewNotification) -> Self {
        Self {
            kind: new.kind,
            source_ref: new.source_ref.clone(),
            from: new.from_profile_id.clone(),
            to: new.to_profile_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// This caller won; the row is committed.
    Reserved(Notification),
    AlreadyExists,
}

/// Check-and-insert in one statement. The partial unique index decides
/// races, and the loser sees `AlreadyExists` rather than an error.
#[derive(Clone)]
pub struct DedupGuard {
    store: DynNotificationStore,
}

impl DedupGuard {
    pub fn new(store: DynNotificationStore) -> Self {
        Self { store }
    }

    pub async fn check_and_reserve(&self, new: &NewNotification) -> CoreResult<Reservation> {
        match self.store.insert_if_absent(new).await? {
            Some(notification) => Ok(Reservation::Reserved(notification)),
            None => {
                tracing::debug!("Duplicate notification suppressed: {:?}", DedupKey::of(new));
                Ok(Reservation::AlreadyExists)
            }
        }
    }
}
