//! Hierarchical path index.
//!
//! Every ingested path is decomposed into its prefixes ([`PathNode`]) and
//! written to a pluggable backend ([`IndexDriver`]) selected by URL scheme
//! through a [`DriverRegistry`]. The index answers two questions: which
//! nodes sit directly below a prefix, and which leaves match a glob.

pub mod driver;
pub mod elasticsearch;
pub mod memory;
pub mod node;

pub use driver::{DriverFactory, DriverRegistry, IndexDriver, NodeFilter};
pub use elasticsearch::ElasticsearchDriver;
pub use memory::MemoryDriver;
pub use node::PathNode;

use crate::core::config::IndexConfig;
use crate::core::retry::{retry_with_config, with_timeout, RetryConfig};
use crate::core::{QuarryError, Result};
use crate::query::parse_glob;
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use url::Url;

/// Receives every path seen by the ingestion front-ends.
#[async_trait::async_trait]
pub trait IndexSink: Send + Sync {
    /// Make `path` and all of its prefixes discoverable.
    async fn update(&self, path: &str) -> Result<()>;
}

/// Path index over a backend driver.
pub struct PathIndex {
    driver: Arc<dyn IndexDriver>,
    /// Paths already written successfully
    seen: DashSet<String>,
    request_timeout: Duration,
    max_results: usize,
}

impl PathIndex {
    /// Wrap an already initialised driver.
    pub fn new(driver: Arc<dyn IndexDriver>, config: &IndexConfig) -> Self {
        Self {
            driver,
            seen: DashSet::new(),
            request_timeout: config.request_timeout,
            max_results: config.max_results,
        }
    }

    /// Resolve the driver for `config.url`, initialise it and wrap it.
    pub async fn connect(registry: &DriverRegistry, config: &IndexConfig) -> Result<Self> {
        let url = Url::parse(&config.url).map_err(|e| {
            QuarryError::config(format!("Invalid index url {:?}: {}", config.url, e))
        })?;
        let driver = registry.create(&url, config)?;

        let backend = driver.as_ref();
        let timeout = config.request_timeout;
        retry_with_config(RetryConfig::with_attempts(config.init_attempts), move || {
            with_timeout(timeout, backend.init())
        })
        .await?;

        info!(driver = driver.name(), url = %url, "Path index ready");
        Ok(Self::new(driver, config))
    }

    /// Name of the active driver.
    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    /// Number of distinct paths written by this process.
    pub fn indexed_paths(&self) -> usize {
        self.seen.len()
    }

    /// Nodes directly below `path`, ordered by key. An empty path lists the
    /// top level.
    pub async fn get_children(&self, path: &str) -> Result<Vec<PathNode>> {
        let filter = NodeFilter::Children {
            parent: path.to_string(),
        };
        self.select(&filter).await
    }

    /// Leaf paths matching the glob `pattern`, ordered by key.
    pub async fn query_paths(&self, pattern: &str) -> Result<Vec<PathNode>> {
        let filter = NodeFilter::Leaves(parse_glob(pattern)?);
        self.select(&filter).await
    }

    /// Check that the backend answers within the request timeout.
    pub async fn ping(&self) -> Result<()> {
        with_timeout(self.request_timeout, self.driver.ping()).await
    }

    /// Release the backend.
    pub async fn close(&self) -> Result<()> {
        debug!(driver = self.driver.name(), "Closing path index");
        with_timeout(self.request_timeout, self.driver.close()).await
    }

    async fn select(&self, filter: &NodeFilter) -> Result<Vec<PathNode>> {
        let mut nodes = with_timeout(
            self.request_timeout,
            self.driver.query(filter, self.max_results),
        )
        .await?;

        // Backend matching is re-checked against the compiled filter.
        nodes.retain(|node| filter.accepts(node));
        nodes.sort();
        nodes.dedup();
        Ok(nodes)
    }
}

#[async_trait::async_trait]
impl IndexSink for PathIndex {
    async fn update(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(QuarryError::protocol("empty metric path"));
        }
        if !self.seen.insert(path.to_string()) {
            return Ok(());
        }

        let nodes = PathNode::decompose(path);
        match with_timeout(self.request_timeout, self.driver.update(&nodes)).await {
            Ok(()) => {
                trace!(path, nodes = nodes.len(), "Indexed path");
                Ok(())
            },
            Err(error) => {
                // Forget the path so the next sighting retries the write.
                self.seen.remove(path);
                warn!(path, %error, "Failed to index path");
                Err(error)
            },
        }
    }
}

impl std::fmt::Debug for PathIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathIndex")
            .field("driver", &self.driver.name())
            .field("indexed_paths", &self.seen.len())
            .field("request_timeout", &self.request_timeout)
            .field("max_results", &self.max_results)
            .finish()
    }
}
