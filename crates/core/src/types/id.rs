//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create validated string ID wrappers that
//! prevent accidentally mixing identifiers from different entities, e.g.
//! polling a transaction endpoint with an order id.
//!
//! [`UserId`] is the exception: it is opaque and carried verbatim.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted identifier length.
pub const MAX_ID_LENGTH: usize = 128;

/// Errors produced when parsing an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The identifier is empty after trimming.
    #[error("{kind} cannot be empty")]
    Empty {
        /// Which identifier was being parsed.
        kind: &'static str,
    },
    /// The identifier exceeds [`MAX_ID_LENGTH`].
    #[error("{kind} must be at most {MAX_ID_LENGTH} characters")]
    TooLong {
        /// Which identifier was being parsed.
        kind: &'static str,
    },
    /// The identifier contains a character that is unsafe in a URL path segment.
    #[error("{kind} contains invalid character {found:?}")]
    InvalidCharacter {
        /// Which identifier was being parsed.
        kind: &'static str,
        /// The offending character.
        found: char,
    },
}

/// Validate a raw identifier and return the trimmed value.
///
/// Identifiers end up as URL path segments, so separators and escapes are
/// rejected outright instead of being percent-encoded.
///
/// # Errors
///
/// Returns an [`IdError`] when the value is empty, too long, or contains
/// whitespace, `/`, `?`, `#` or `%`.
pub fn validate_id<'a>(kind: &'static str, raw: &'a str) -> Result<&'a str, IdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty { kind });
    }
    if trimmed.chars().count() > MAX_ID_LENGTH {
        return Err(IdError::TooLong { kind });
    }
    if let Some(found) = trimmed
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%'))
    {
        return Err(IdError::InvalidCharacter { kind, found });
    }
    Ok(trimmed)
}

/// Macro to define a validated string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` that validate through `TryFrom<String>`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `Display`
/// - `parse()` and `as_str()`
///
/// # Example
///
/// ```rust
/// # use destiny_core::define_id;
/// define_id!(ReportId, "report id");
///
/// let id = ReportId::parse(" r-42 ").unwrap();
/// assert_eq!(id.as_str(), "r-42");
/// assert!(ReportId::parse("a/b").is_err());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $kind:literal) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate an identifier.
            ///
            /// # Errors
            ///
            /// Returns an `IdError` if the value is not a usable identifier.
            pub fn parse(raw: &str) -> ::core::result::Result<Self, $crate::IdError> {
                $crate::validate_id($kind, raw).map(|id| Self(id.to_owned()))
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::convert::TryFrom<String> for $name {
            type Error = $crate::IdError;

            fn try_from(raw: String) -> ::core::result::Result<Self, Self::Error> {
                Self::parse(&raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(OrderId, "order id");
define_id!(TransactionId, "transaction id");

/// Backend-assigned user identifier.
///
/// Opaque: it never appears in a request path, so any string the backend
/// sends is accepted unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims() {
        let id = OrderId::parse("  ord_123 ").unwrap();
        assert_eq!(id.as_str(), "ord_123");
        assert_eq!(id.to_string(), "ord_123");
    }

    #[test]
    fn test_parse_rejects_path_characters() {
        for raw in ["a/b", "a?b", "a#b", "a%2F", "a b"] {
            assert!(
                matches!(
                    TransactionId::parse(raw),
                    Err(IdError::InvalidCharacter { .. })
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_rejects_empty_and_long() {
        assert_eq!(
            OrderId::parse(""),
            Err(IdError::Empty { kind: "order id" })
        );
        let long = "x".repeat(MAX_ID_LENGTH + 1);
        assert_eq!(
            OrderId::parse(&long),
            Err(IdError::TooLong { kind: "order id" })
        );
    }

    #[test]
    fn test_error_names_the_identifier() {
        let err = TransactionId::parse("").unwrap_err();
        assert_eq!(err.to_string(), "transaction id cannot be empty");
    }

    #[test]
    fn test_deserialize_validates() {
        let id: OrderId = serde_json::from_str("\"o-1\"").unwrap();
        assert_eq!(id.as_str(), "o-1");
        assert!(serde_json::from_str::<OrderId>("\"\"").is_err());
        assert!(serde_json::from_str::<TransactionId>("\"a/b\"").is_err());
    }

    #[test]
    fn test_user_id_is_carried_verbatim() {
        let raw = "auth0|abc/def 1?x#%";
        let id: UserId = serde_json::from_value(serde_json::json!(raw)).unwrap();
        assert_eq!(id.as_str(), raw);
        assert_eq!(id.to_string(), raw);
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!(raw));
    }
}
