//! Status enums reported by the backend.

use serde::{Deserialize, Serialize};

/// Order status returned by the order endpoint.
///
/// Values the client does not recognise deserialize to [`OrderStatus::Unknown`]
/// so a new backend state surfaces as an "unknown status" error instead of a
/// decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Payment captured.
    Paid,
    /// Checkout completed, payment not yet confirmed.
    PaymentPending,
    /// The customer or processor cancelled the order.
    Cancelled,
    /// The payment was returned.
    Refunded,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paid => write!(f, "PAID"),
            Self::PaymentPending => write!(f, "PAYMENT_PENDING"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Refunded => write!(f, "REFUNDED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Result of the legacy subscription transaction status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionResult {
    Success,
    Fail,
    /// Not settled yet; ask again after `nextQueryInterval` seconds.
    RepeatQuery,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for TransactionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Fail => write!(f, "FAIL"),
            Self::RepeatQuery => write!(f, "REPEAT_QUERY"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Gender as collected on the profile form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    PreferNotToSay,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Male => write!(f, "MALE"),
            Self::Female => write!(f, "FEMALE"),
            Self::PreferNotToSay => write!(f, "PREFER_NOT_TO_SAY"),
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MALE" => Ok(Self::Male),
            "FEMALE" => Ok(Self::Female),
            "PREFER_NOT_TO_SAY" => Ok(Self::PreferNotToSay),
            _ => Err(format!("invalid gender: {s}")),
        }
    }
}
