//! Core types for Destiny.
//!
//! This module provides type-safe wrappers for the client's domain concepts.

pub mod email;
pub mod id;
pub mod profile;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use profile::{ProfileUpdate, UserProfile};
pub use status::*;
