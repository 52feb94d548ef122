//! Point sink trait.

use crate::core::{MetricPoint, Result};

/// Receives decoded samples from the ingestion front-ends.
///
/// The point is borrowed; handlers reuse it for the next sample as soon as
/// `set` returns, so implementations copy whatever they keep.
#[async_trait::async_trait]
pub trait PointSink: Send + Sync {
    /// Record one sample.
    async fn set(&self, point: &MetricPoint) -> Result<()>;
}
