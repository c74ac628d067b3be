//! Authentication service.
//!
//! Email one-time codes and OAuth sign-in. Both flows end the same way: the
//! API client has already persisted the token from the response header, and
//! the returned profile becomes the session's current user.

mod error;

pub use error::AuthError;

use tracing::{info, instrument, warn};

use destiny_core::{Email, UserProfile};

use crate::api::{ApiClient, OAuthCallback, OAuthProvider};
use crate::session::SessionCache;

/// Longest one-time code the backend issues.
const MAX_CODE_LENGTH: usize = 12;

/// Authentication service.
///
/// `api` and `session` must share one credential store, otherwise the token
/// persisted by a sign-in is invisible to the session.
#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
    session: SessionCache,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(api: ApiClient, session: SessionCache) -> Self {
        Self { api, session }
    }

    /// Email a one-time code and return the normalized address it went to.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` before any request when the address
    /// is malformed, or `AuthError::Api` if the backend call fails.
    #[instrument(skip(self, email))]
    pub async fn send_otp(&self, email: &str) -> Result<Email, AuthError> {
        let email = Email::parse(email)?;
        self.api.send_otp(&email).await?;
        info!(email = %email, "One-time code sent");
        Ok(email)
    }

    /// Sign in with an emailed one-time code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` or `AuthError::InvalidCode` before
    /// any request, `AuthError::Api` if the backend refuses the code, or
    /// `AuthError::MissingToken` if it answered without a session token.
    #[instrument(skip(self, email, code))]
    pub async fn verify_otp(&self, email: &str, code: &str) -> Result<UserProfile, AuthError> {
        let email = Email::parse(email)?;
        let code = validate_code(code)?;
        let (profile, token_issued) = self.api.verify_otp_session(&email, code).await?;
        self.establish_session(profile, token_issued)
    }

    /// Sign in with the parameters an OAuth provider redirected back with.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Api` if the exchange fails, or
    /// `AuthError::MissingToken` if the backend issued no session token.
    #[instrument(skip(self, callback), fields(provider = %provider))]
    pub async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        callback: &OAuthCallback,
    ) -> Result<UserProfile, AuthError> {
        let (profile, token_issued) = self.api.oauth_session(provider, callback).await?;
        self.establish_session(profile, token_issued)
    }

    /// End the session locally: cached profile, token and identity fields.
    pub fn logout(&self) {
        self.session.sign_out();
    }

    /// A token left over from an earlier session does not count: this
    /// response must have issued one.
    fn establish_session(
        &self,
        profile: UserProfile,
        token_issued: bool,
    ) -> Result<UserProfile, AuthError> {
        if !token_issued {
            warn!(user_id = %profile.id, "Sign-in succeeded without a session token");
            return Err(AuthError::MissingToken);
        }
        self.session.set_profile(profile.clone());
        info!(user_id = %profile.id, "Signed in");
        Ok(profile)
    }
}

fn validate_code(code: &str) -> Result<&str, AuthError> {
    let code = code.trim();
    if code.is_empty()
        || code.len() > MAX_CODE_LENGTH
        || !code.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(AuthError::InvalidCode);
    }
    Ok(code)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ClientConfig;
    use crate::credentials::{Credentials, MemoryStore};

    /// Points at a closed port: any request that escapes validation fails.
    fn service() -> AuthService {
        let config = ClientConfig::new("http://127.0.0.1:9").unwrap();
        let credentials = Credentials::new(Arc::new(MemoryStore::new()));
        let api = ApiClient::new(&config, credentials.clone()).unwrap();
        let session = SessionCache::new(Arc::new(api.clone()), credentials);
        AuthService::new(api, session)
    }

    #[test]
    fn test_validate_code() {
        assert_eq!(validate_code(" 123456 ").unwrap(), "123456");
        assert!(validate_code("").is_err());
        assert!(validate_code("12 34").is_err());
        assert!(validate_code("1234567890123").is_err());
    }

    #[tokio::test]
    async fn test_send_otp_rejects_bad_email_before_request() {
        let err = service().send_otp("not-an-email").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmail(_)));
        assert_eq!(err.user_message(), "Please enter a valid email address.");
    }

    #[tokio::test]
    async fn test_verify_otp_rejects_blank_code_before_request() {
        let err = service()
            .verify_otp("seer@example.com", "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCode));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_api_error() {
        let err = service().send_otp("seer@example.com").await.unwrap_err();
        match err {
            AuthError::Api(api) => assert!(api.is_transport()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
