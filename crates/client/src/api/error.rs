//! Error types for the backend API client.
//!
//! Every failure a request can produce is normalized into [`ApiError`], and
//! [`ApiError::user_message`] is the single place where error codes become
//! text a user can read.

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when calling the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (connect failure, timeout, reset).
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("API error ({code}, HTTP {http_status}): {message}")]
    Rejected {
        /// Backend error code, or `HTTP_<status>` when the body had none.
        code: String,
        /// Backend-supplied message (may be empty).
        message: String,
        /// Backend-supplied severity.
        severity: Severity,
        /// HTTP status code of the response.
        http_status: u16,
    },

    /// A success response whose body could not be decoded.
    #[error("parse error: {0}")]
    Decode(String),

    /// The endpoint could not be resolved against the configured base URL.
    #[error("invalid endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
}

/// Severity attached to backend error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Error,
    Critical,
    #[serde(other)]
    Unknown,
}

/// Error body returned by the backend. All fields are optional.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

impl ApiError {
    /// Build a [`ApiError::Rejected`] from a status code and raw response body.
    ///
    /// Bodies that are not the backend's JSON error shape still produce an
    /// error, keyed by the HTTP status.
    #[must_use]
    pub fn from_response(http_status: u16, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        Self::Rejected {
            code: parsed
                .code
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| format!("HTTP_{http_status}")),
            message: parsed.message.unwrap_or_default(),
            severity: parsed.severity.unwrap_or_default(),
            http_status,
        }
    }

    /// Whether the failure happened before any response arrived.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether the backend actively refused the request.
    ///
    /// For an authenticated endpoint this means the stored credential can
    /// no longer be trusted.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// The backend error code, if the backend answered.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }

    /// A human-readable message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(err) if err.is_timeout() => {
                "The request timed out. Please try again.".to_string()
            }
            Self::Transport(_) => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            Self::Decode(_) => "The server sent an unexpected response.".to_string(),
            Self::InvalidEndpoint { .. } => "The client is misconfigured.".to_string(),
            Self::Rejected {
                code,
                message,
                http_status,
                ..
            } => message_for_code(code)
                .map(str::to_string)
                .or_else(|| (!message.trim().is_empty()).then(|| message.clone()))
                .unwrap_or_else(|| message_for_status(*http_status).to_string()),
        }
    }
}

/// Messages for the error codes the backend is known to send.
fn message_for_code(code: &str) -> Option<&'static str> {
    let message = match code {
        "UNAUTHORIZED" | "TOKEN_INVALID" => "Please sign in to continue.",
        "TOKEN_EXPIRED" => "Your session has expired. Please sign in again.",
        "ACCOUNT_LOCKED" => "Your account is locked. Please contact support.",
        "ACCOUNT_DISABLED" => "Your account has been disabled.",
        "USER_NOT_FOUND" => "We could not find an account for that email.",
        "INVALID_OTP" => "That code is not valid. Please check it and try again.",
        "OTP_EXPIRED" => "That code has expired. Please request a new one.",
        "OTP_RATE_LIMITED" => "Too many codes requested. Please wait a moment.",
        "OAUTH_FAILED" => "Sign-in with that provider failed. Please try again.",
        "ORDER_NOT_FOUND" => "We could not find that order.",
        "PAYMENT_FAILED" => "Your payment could not be processed.",
        "PLAN_NOT_FOUND" => "That subscription plan is no longer available.",
        "VALIDATION_ERROR" => "Some of the information you entered is invalid.",
        _ => return None,
    };
    Some(message)
}

const fn message_for_status(http_status: u16) -> &'static str {
    match http_status {
        400 => "The request was invalid.",
        401 => "Please sign in to continue.",
        403 => "You do not have permission to do that.",
        404 => "The requested resource was not found.",
        409 => "That conflicts with the current state. Please refresh and try again.",
        429 => "Too many requests. Please slow down.",
        500..=599 => "The server had a problem. Please try again later.",
        _ => "Something went wrong. Please try again.",
    }
}
