//! Payment confirmation.
//!
//! After the hosted checkout redirects back, the app knows either an order id
//! (current flow) or a transaction id (legacy subscription flow) and has to
//! wait for the backend to settle the payment. [`PaymentStatusPoller`] does the
//! waiting; this module holds the types around it.

pub mod poller;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use destiny_core::{IdError, OrderId, TransactionId};

pub use poller::{PaymentStatusPoller, PollerSettings, Verdict};

/// Errors building a payment subject from redirect query parameters.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("neither orderId nor transactionId was provided")]
    MissingIdentifier,

    #[error("invalid payment identifier: {0}")]
    InvalidIdentifier(#[from] IdError),
}

/// What is being confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentSubject {
    Order(OrderId),
    Transaction(TransactionId),
}

impl PaymentSubject {
    /// Build a subject from the `orderId` / `transactionId` query values.
    ///
    /// Blank values count as absent. When both are present the order id is
    /// used.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::MissingIdentifier` when neither value is
    /// present, or `PaymentError::InvalidIdentifier` when the chosen value is
    /// not a valid identifier.
    pub fn from_query(
        order_id: Option<&str>,
        transaction_id: Option<&str>,
    ) -> Result<Self, PaymentError> {
        fn present(value: Option<&str>) -> Option<&str> {
            value.map(str::trim).filter(|v| !v.is_empty())
        }

        if let Some(order_id) = present(order_id) {
            return Ok(Self::Order(OrderId::parse(order_id)?));
        }
        if let Some(transaction_id) = present(transaction_id) {
            return Ok(Self::Transaction(TransactionId::parse(transaction_id)?));
        }
        Err(PaymentError::MissingIdentifier)
    }

    /// Where to send the user when the payment was declined or cancelled.
    #[must_use]
    pub fn cancel_path(&self) -> String {
        let query = match self {
            Self::Order(id) => url::form_urlencoded::Serializer::new(String::new())
                .append_pair("orderId", id.as_str())
                .finish(),
            Self::Transaction(id) => url::form_urlencoded::Serializer::new(String::new())
                .append_pair("transactionId", id.as_str())
                .finish(),
        };
        format!("/cancel?{query}")
    }

    /// Identifier value, for logs and breadcrumbs.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Order(id) => id.as_str(),
            Self::Transaction(id) => id.as_str(),
        }
    }

    const fn unknown_status_message(&self) -> &'static str {
        match self {
            Self::Order(_) => "unknown order status",
            Self::Transaction(_) => "unknown payment status",
        }
    }
}

impl std::fmt::Display for PaymentSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Order(id) => write!(f, "order {id}"),
            Self::Transaction(id) => write!(f, "transaction {id}"),
        }
    }
}

/// Observable state of a payment confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Checking,
    Succeeded,
    Failed,
    Errored { message: String },
}

impl PaymentStatus {
    /// Whether polling has stopped.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Checking)
    }
}

/// Performs in-app navigation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Stops a running poller.
///
/// After [`abort`](Self::abort) the poller issues no further requests,
/// ignores responses that arrive late and skips any pending redirect.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}
