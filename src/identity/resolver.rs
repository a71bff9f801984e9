use crate::error::{CoreError, CoreResult};
use crate::identity::{AuthId, DynProfileStore, ProfileId};

/// Which lookup matched an externally supplied identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    AuthId,
    ProfileId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub profile_id: ProfileId,
    pub matched_by: MatchedBy,
}

/// Normalizes AuthIDs and ProfileIDs to a ProfileID. Read-only.
#[derive(Clone)]
pub struct IdentityResolver {
    profiles: DynProfileStore,
}

impl IdentityResolver {
    pub fn new(profiles: DynProfileStore) -> Self {
        Self { profiles }
    }

    /// Auth id lookup runs first since session-originated identifiers are
    /// the common case.
    pub async fn resolve_tagged(&self, identifier: &str) -> CoreResult<Resolution> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(CoreError::IdentityNotFound(String::new()));
        }

        if let Some(profile_id) = self
            .profiles
            .find_by_auth_id(&AuthId::new(identifier))
            .await?
        {
            tracing::debug!("Resolved auth id {} to profile {}", identifier, profile_id);
            return Ok(Resolution {
                profile_id,
                matched_by: MatchedBy::AuthId,
            });
        }

        if let Some(profile_id) = self.profiles.find_by_profile_id(identifier).await? {
            return Ok(Resolution {
                profile_id,
                matched_by: MatchedBy::ProfileId,
            });
        }

        Err(CoreError::IdentityNotFound(identifier.to_string()))
    }

    pub async fn resolve(&self, identifier: &str) -> CoreResult<ProfileId> {
        Ok(self.resolve_tagged(identifier).await?.profile_id)
    }

    pub fn profiles(&self) -> &DynProfileStore {
        &self.profiles
    }
}
