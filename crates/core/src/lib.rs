//! Destiny Core - Shared domain types.
//!
//! This crate provides the types shared by every Destiny component:
//! - `destiny-client` - HTTP client, session cache and payment poller
//! - `destiny-integration-tests` - End-to-end tests against a fake backend
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no clocks.
//! Everything here can be constructed and inspected in plain unit tests.
//!
//! # Modules
//!
//! - [`types`] - Identifiers, email addresses, user profiles and payment statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
