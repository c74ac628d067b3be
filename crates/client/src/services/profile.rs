//! Profile editing.

use tracing::{debug, instrument};

use destiny_core::{ProfileUpdate, UserProfile};

use crate::api::{ApiClient, ApiError};
use crate::session::SessionCache;

/// Saves profile changes and keeps the session's copy in step.
#[derive(Clone)]
pub struct ProfileService {
    api: ApiClient,
    session: SessionCache,
}

impl ProfileService {
    #[must_use]
    pub const fn new(api: ApiClient, session: SessionCache) -> Self {
        Self { api, session }
    }

    /// Send `update` to the backend, then merge the profile it saved into
    /// the cached one.
    ///
    /// An empty update is not sent when a profile is already cached.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or is rejected. The cached
    /// profile is left untouched in that case.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        if update.is_empty()
            && let Some(current) = self.session.current_user()
        {
            debug!("Empty profile update; nothing to send");
            return Ok(current);
        }

        let saved = self.api.update_profile(update).await?;
        self.session.update_user_data(&ProfileUpdate::from(&saved));
        Ok(saved)
    }

    /// Re-fetch the profile from the backend, bypassing the cache.
    pub async fn refresh(&self) -> Option<UserProfile> {
        self.session.load_user_profile(true).await
    }
}
