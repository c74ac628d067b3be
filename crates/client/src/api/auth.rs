//! Authentication endpoints.
//!
//! Successful verification and OAuth responses return the user's profile in
//! the body and the session token in the `Authorization` header; the client
//! persists the token as part of the request.

use reqwest::Method;
use serde::Serialize;
use serde::de::IgnoredAny;
use tracing::instrument;

use destiny_core::{Email, UserProfile};

use super::client::ApiClient;
use super::error::ApiError;

#[derive(Serialize)]
struct SendOtpRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct VerifyOtpRequest<'a> {
    email: &'a str,
    code: &'a str,
}

/// Supported OAuth identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthProvider {
    Google,
    Apple,
    Facebook,
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Google => write!(f, "google"),
            Self::Apple => write!(f, "apple"),
            Self::Facebook => write!(f, "facebook"),
        }
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "apple" => Ok(Self::Apple),
            "facebook" => Ok(Self::Facebook),
            _ => Err(format!("unsupported oauth provider: {s}")),
        }
    }
}

/// OAuth authorization-code callback parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCallback {
    /// Authorization code returned by the provider.
    pub code: String,
    /// CSRF state echoed by the provider.
    pub state: String,
    /// Redirect URI used in the authorization request.
    pub redirect_uri: String,
}

impl ApiClient {
    /// Email a one-time login code.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or is rejected.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn send_otp(&self, email: &Email) -> Result<(), ApiError> {
        let _: IgnoredAny = self
            .post(
                "/auth/v1/otp/send",
                &SendOtpRequest {
                    email: email.as_str(),
                },
            )
            .await?;
        Ok(())
    }

    /// Exchange an emailed code for a session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the code is rejected.
    pub async fn verify_otp(&self, email: &Email, code: &str) -> Result<UserProfile, ApiError> {
        self.verify_otp_session(email, code)
            .await
            .map(|(profile, _)| profile)
    }

    /// Complete an OAuth sign-in with the provider's callback parameters.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the exchange is rejected.
    pub async fn oauth_callback(
        &self,
        provider: OAuthProvider,
        callback: &OAuthCallback,
    ) -> Result<UserProfile, ApiError> {
        self.oauth_session(provider, callback)
            .await
            .map(|(profile, _)| profile)
    }

    /// [`ApiClient::verify_otp`], also reporting whether this response
    /// issued a session token.
    #[instrument(skip(self, code), fields(email = %email))]
    pub(crate) async fn verify_otp_session(
        &self,
        email: &Email,
        code: &str,
    ) -> Result<(UserProfile, bool), ApiError> {
        let request = VerifyOtpRequest {
            email: email.as_str(),
            code: code.trim(),
        };
        let (profile, token) = self
            .exchange(Method::POST, "/auth/v1/otp/verify", Some(&request))
            .await?;
        Ok((profile, token.is_some()))
    }

    /// [`ApiClient::oauth_callback`], also reporting whether this response
    /// issued a session token.
    #[instrument(skip(self, callback), fields(provider = %provider))]
    pub(crate) async fn oauth_session(
        &self,
        provider: OAuthProvider,
        callback: &OAuthCallback,
    ) -> Result<(UserProfile, bool), ApiError> {
        let endpoint = format!("/auth/v1/oauth/{provider}/callback");
        let (profile, token) = self
            .exchange(Method::POST, &endpoint, Some(callback))
            .await?;
        Ok((profile, token.is_some()))
    }
}
