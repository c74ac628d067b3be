//! Destiny Client - SDK for the Destiny backend.
//!
//! Everything the consumer app does that is not presentation:
//!
//! - [`api`] - HTTP client, error normalization, bearer token handling
//! - [`session`] - Single-flight cache of the signed-in user's profile
//! - [`payment`] - Polling loop that waits for a checkout to settle
//! - [`services`] - Sign-in, profile editing and checkout flows
//! - [`credentials`] - Persisted token and identity storage
//! - [`config`] - Environment configuration
//! - [`telemetry`] - Tracing and Sentry setup
//!
//! # Wiring
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use destiny_client::{ApiClient, ClientConfig, Credentials, SessionCache};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let credentials = Credentials::new(config.open_store()?);
//! let api = ApiClient::new(&config, credentials.clone())?;
//! let session = SessionCache::new(Arc::new(api.clone()), credentials);
//!
//! if let Some(user) = session.load_user_profile(false).await {
//!     println!("signed in as {}", user.display_name());
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod credentials;
pub mod payment;
pub mod scheduler;
pub mod services;
pub mod session;
pub mod telemetry;

pub use api::{ApiClient, ApiError};
pub use config::{ClientConfig, ConfigError};
pub use credentials::{CredentialStore, Credentials, FileStore, MemoryStore, StoreError};
pub use payment::{AbortHandle, Navigator, PaymentError, PaymentStatus, PaymentStatusPoller, PaymentSubject};
pub use scheduler::{Scheduler, TokioScheduler};
pub use services::{AuthService, CheckoutService, ProfileService};
pub use session::SessionCache;
