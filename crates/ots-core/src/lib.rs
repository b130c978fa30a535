//! `ots` Core Library
//!
//! Shared functionality for `ots` components:
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers and the storage error type
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use config::Config;
pub use db::DatabaseError;
pub use error::{Error, Result};
