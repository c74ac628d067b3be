//! Application services built on the API client and the session cache.
//!
//! # Services
//!
//! - `auth` - Email one-time codes, OAuth sign-in, logout
//! - `profile` - Profile updates
//! - `checkout` - Order creation and payment confirmation

pub mod auth;
pub mod checkout;
pub mod profile;

pub use auth::{AuthError, AuthService};
pub use checkout::{CheckoutError, CheckoutService};
pub use profile::ProfileService;
