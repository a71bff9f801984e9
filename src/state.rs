use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::push::tokens::SqliteDeviceTokenStore;
use crate::push::{DynPushTransport, HttpPushTransport, NoopPushTransport, PushError};
use crate::social::{SocialService, SocialSettings};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub social: Arc<SocialService>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config, push: DynPushTransport) -> Self {
        let settings = SocialSettings {
            push_timeout: config.push_timeout(),
            list_limit: config.notifications.list_limit,
            notice_senders: config.auth.notice_senders.clone(),
        };
        let social = Arc::new(SocialService::new(db.clone(), push, settings));
        Self { db, config, social }
    }

    /// State with the push transport the config asks for.
    pub fn from_config(db: DbPool, config: Config) -> Result<Self, PushError> {
        let push = push_transport(&db, &config)?;
        Ok(Self::new(db, config, push))
    }
}

/// HTTP gateway when one is configured, otherwise a transport that drops
/// every message.
pub fn push_transport(db: &DbPool, config: &Config) -> Result<DynPushTransport, PushError> {
    match &config.push.gateway_url {
        Some(url) => {
            tracing::info!("Push delivery via {}", url);
            let tokens = Arc::new(SqliteDeviceTokenStore::new(db.clone()));
            Ok(Arc::new(HttpPushTransport::new(
                url.clone(),
                config.push.auth_token.clone(),
                config.push_timeout(),
                tokens,
            )?))
        }
        None => {
            tracing::info!("No push gateway configured, push delivery disabled");
            Ok(Arc::new(NoopPushTransport))
        }
    }
}
