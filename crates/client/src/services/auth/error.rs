//! Authentication error types.

use thiserror::Error;

use crate::api::ApiError;

/// Errors that can occur during sign-in and sign-out.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] destiny_core::EmailError),

    /// The one-time code is blank or malformed.
    #[error("invalid one-time code")]
    InvalidCode,

    /// The backend accepted the sign-in but issued no session token.
    #[error("sign-in response carried no session token")]
    MissingToken,

    /// Backend request failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    /// A human-readable message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidEmail(_) => "Please enter a valid email address.".to_string(),
            Self::InvalidCode => "Please enter the code from your email.".to_string(),
            Self::MissingToken => "Sign-in failed. Please try again.".to_string(),
            Self::Api(err) => err.user_message(),
        }
    }
}
