//! Versegate Common Library
//!
//! Core of the conversational resource aggregation engine:
//! - Scope classification of free-text references
//! - Provider adapters, parallel aggregation and tool-call replay
//! - Streaming answer consumption with turn supervision
//! - Error types, configuration and metrics shared by the services

pub mod config;
pub mod errors;
pub mod metrics;
pub mod resources;
pub mod scope;
pub mod stream;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
