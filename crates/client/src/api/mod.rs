//! Destiny backend REST API client.
//!
//! # Architecture
//!
//! - [`ApiClient`] owns the `reqwest` connection pool and the credential store
//! - Endpoint wrappers are plain methods on `ApiClient`, grouped per area
//! - The session cache and payment poller depend on the narrow
//!   [`ProfileApi`] and [`PaymentStatusApi`] traits, not on `ApiClient`,
//!   so they can be exercised against in-memory fakes
//!
//! # Authentication
//!
//! Endpoints under `/auth` and `/public` are called without a token; every
//! other endpoint gets `Authorization: Bearer <token>`.

pub mod auth;
pub mod client;
pub mod error;
pub mod payments;
pub mod profile;

pub use auth::{OAuthCallback, OAuthProvider};
pub use client::{ApiClient, REQUEST_ID_HEADER};
pub use error::{ApiError, ErrorBody, Severity};
pub use payments::{
    CreatedOrder, OrderStatusResponse, PaymentStatusApi, TransactionStatusResponse,
};
pub use profile::ProfileApi;
