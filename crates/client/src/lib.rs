//! QR table ordering client.
//!
//! A page opened from a table's QR code: it resolves the restaurant and table
//! from the URL, keeps a cart in local storage, signs the diner in, and reads
//! and writes orders, coupons and loyalty points in the hosted document
//! database.
//!
//! [`start`] loads configuration from the environment and mounts an
//! [`OrderPage`] against the hosted services. Tests and embedders can mount
//! one directly with a [`Backend`] (hosted services or the in-process
//! emulator) and a [`LocalStorage`] implementation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod backend;
pub mod cart;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod page;
pub mod repository;
pub mod session;
pub mod startup;
pub mod storage;
pub mod subscription;
pub mod telemetry;
pub mod view;

pub use backend::Backend;
pub use config::BackendConfig;
pub use error::{ClientError, Result};
pub use page::{OrderPage, PageEvent};
pub use startup::{Started, start};
pub use storage::{FileStorage, LocalStorage, MemoryStorage};
