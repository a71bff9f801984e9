pub mod http;
pub mod tokens;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::identity::ProfileId;
use crate::notifications::{Notification, NotificationKind};

pub use http::HttpPushTransport;
pub use tokens::{DeviceTokenStore, DynDeviceTokenStore, SqliteDeviceTokenStore};

pub const MAX_TITLE_CHARS: usize = 64;
pub const MAX_BODY_CHARS: usize = 240;
const ELLIPSIS: &str = "...";

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Push transport error: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub channel_id: String,
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    /// Build the user-facing text for a committed notification.
    pub fn for_notification(notification: &Notification) -> Self {
        let payload = &notification.payload;
        let actor = payload.actor_name.as_str();
        let (title, body) = match notification.kind {
            NotificationKind::Like => ("New like".to_string(), format!("{} liked your post.", actor)),
            NotificationKind::Comment => (
                "New comment".to_string(),
                format!("{} commented on your post.", actor),
            ),
            NotificationKind::Reply => (
                "New reply".to_string(),
                format!("{} replied to your comment.", actor),
            ),
            NotificationKind::ReviewLike => (
                "New heart".to_string(),
                match &payload.subject {
                    Some(subject) => format!("{} sent a heart to your review of {}.", actor, subject),
                    None => format!("{} sent a heart to your review.", actor),
                },
            ),
            NotificationKind::Notice => (
                payload.subject.clone().unwrap_or_else(|| "Notice".to_string()),
                payload.excerpt.clone().unwrap_or_default(),
            ),
        };

        let channel_id = notification.kind.category().as_str().to_string();
        let mut data = BTreeMap::new();
        data.insert("notification_id".to_string(), notification.id.clone());
        data.insert("type".to_string(), notification.kind.as_str().to_string());
        data.insert(
            "source_ref".to_string(),
            notification.source_ref.as_str().to_string(),
        );
        data.insert("channel".to_string(), channel_id.clone());

        Self {
            title: truncate(&title, MAX_TITLE_CHARS),
            body: truncate(&body, MAX_BODY_CHARS),
            channel_id,
            data,
        }
    }
}

/// Cut to at most `max` characters, ending in `...` when shortened.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFailure {
    pub token: String,
    pub error: String,
    /// The gateway reported the token as no longer registered
    pub invalid_token: bool,
}

/// Per-device result of one send. Failures never affect other devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub attempted: usize,
    pub delivered: usize,
    pub failures: Vec<DeviceFailure>,
    pub pruned: usize,
}

impl DeliveryOutcome {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(
        &self,
        recipient: &ProfileId,
        message: &PushMessage,
    ) -> Result<DeliveryOutcome, PushError>;
}

pub type DynPushTransport = Arc<dyn PushTransport>;

/// Used when no gateway is configured.
pub struct NoopPushTransport;

#[async_trait]
impl PushTransport for NoopPushTransport {
    async fn send(
        &self,
        recipient: &ProfileId,
        message: &PushMessage,
    ) -> Result<DeliveryOutcome, PushError> {
        tracing::debug!("Push disabled, dropping '{}' for {}", message.title, recipient);
        Ok(DeliveryOutcome::default())
    }
}
