//! QR Table Core - Shared types library.
//!
//! This crate provides the domain types used by the QR table ordering client:
//! - `client` - Session store, auth gateway, order repository and page binder
//! - `integration-tests` - End-to-end ordering flows against the emulator backend
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no network
//! clients, no storage. This keeps it lightweight and allows it to be used
//! anywhere, including in a browser build.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for document IDs, table numbers, prices,
//!   emails, payment modes and order statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
