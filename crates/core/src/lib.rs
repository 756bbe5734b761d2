//! Masjid Core - Shared types library.
//!
//! This crate provides common types used across all Masjid portal components:
//! - `site` - Public site and the role-gated admin dashboard
//! - `cli` - Command-line tools for operating the hosted backend
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, and roles
//! - [`auth`] - Sessions, identities, admin records and security events
//! - [`prayer`] - Daily prayer times
//! - [`submissions`] - Contact messages and registrations sent through the public site

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod prayer;
pub mod submissions;
pub mod types;

pub use auth::*;
pub use prayer::*;
pub use submissions::*;
pub use types::*;
