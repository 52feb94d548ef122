//! Point storage seam.
//!
//! Ingestion front-ends hand every decoded sample to a [`PointSink`]. The
//! crate ships [`MemoryStore`], a bounded per-series buffer; durable time
//! series storage plugs in behind the same trait.

pub mod backend;
pub mod memory;

pub use backend::PointSink;
pub use memory::{MemoryStore, Sample};
