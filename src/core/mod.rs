//! Core domain types, configuration and error handling for Quarry.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder};
pub use error::{QuarryError, Result};
pub use types::{MetricPoint, Protocol};
