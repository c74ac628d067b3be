//! User profile endpoints.

use async_trait::async_trait;
use tracing::instrument;

use destiny_core::{ProfileUpdate, UserProfile};

use super::client::ApiClient;
use super::error::ApiError;

const PROFILE_ENDPOINT: &str = "/user_profile/v1";
const UPDATE_PROFILE_ENDPOINT: &str = "/user_profile/v1/update_user_profile";

/// Source of the signed-in user's profile.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// Fetch the profile belonging to the stored credential.
    async fn fetch_profile(&self) -> Result<UserProfile, ApiError>;
}

#[async_trait]
impl ProfileApi for ApiClient {
    #[instrument(skip(self))]
    async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        self.get(PROFILE_ENDPOINT).await
    }
}

impl ApiClient {
    /// Send a partial profile update and return the updated profile.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or is rejected.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        self.put(UPDATE_PROFILE_ENDPOINT, update).await
    }
}
