//! Database Module
//!
//! Database connection management for the auth core.

pub mod connection;

// Re-export commonly used types
pub use connection::{DatabaseConfig, DatabasePool};
