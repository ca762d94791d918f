//! Shared domain types for the mochi gateway: the crate-wide error type
//! and the server configuration.

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};
