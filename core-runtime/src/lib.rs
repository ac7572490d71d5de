//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the server binary and the
//! maintenance commands:
//! - Logging and tracing initialisation
//! - Environment-sourced server configuration
//!
//! Configuration is read once at startup into a [`ServerConfig`](config::ServerConfig);
//! nothing below this crate reads the environment directly.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
