//! Quarry - Graphite-compatible metrics intake.
//!
//! Quarry accepts metric samples over the two Graphite carbon protocols,
//! forwards them to a point sink and records every metric path in a
//! hierarchical index that can be browsed and queried with Graphite globs.
//!
//! # Features
//!
//! - **Plaintext protocol**: `<path> <value> <timestamp>` triples (port 2003)
//! - **Pickle protocol**: length-prefixed pickled batches (port 2004)
//! - **Path index**: prefix decomposition with de-duplication and pluggable
//!   backends (Elasticsearch, in-memory)
//! - **Glob queries**: `*`, `?`, `<a-b>` ranges and `{x,y}` alternation
//! - **Bounded intake**: connection cap, idle timeouts and graceful drain
//!
//! # Architecture
//!
//! - `pickle`: stack machine decoder and encoder for pickle protocol 2
//! - `receiver`: TCP listeners and per-protocol connection handlers
//! - `index`: path index, driver contract and drivers
//! - `query`: glob parser and matcher
//! - `storage`: point sink contract and the bundled memory store
//! - `core`: configuration, errors and shared types
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use quarry_lib::core::Config;
//! use quarry_lib::Application;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let app = Application::new(config)?;
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod application;
pub mod cli;
pub mod core;
pub mod index;
pub mod monitoring;
pub mod pickle;
pub mod query;
pub mod receiver;
pub mod storage;

// Re-export core types for convenience
pub use crate::application::{Application, RunningApplication};
pub use crate::core::{Config, MetricPoint, QuarryError, Result};
pub use crate::index::{PathIndex, PathNode};
pub use crate::query::Query;
