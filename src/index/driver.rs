//! Backend driver contract and the name -> factory registry.

use super::node::PathNode;
use crate::core::config::IndexConfig;
use crate::core::{QuarryError, Result};
use crate::query::Query;
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// Which nodes a driver query selects.
#[derive(Debug, Clone)]
pub enum NodeFilter {
    /// Nodes directly below `parent`; an empty parent selects depth 0.
    Children {
        /// Browse prefix
        parent: String,
    },
    /// Leaf nodes at the query's depth whose key matches the query.
    Leaves(Query),
}

impl NodeFilter {
    /// Evaluate the filter against one node.
    pub fn accepts(&self, node: &PathNode) -> bool {
        match self {
            NodeFilter::Children { parent } => node.is_child_of(parent),
            NodeFilter::Leaves(query) => {
                node.leaf && node.depth == query.depth() && query.matches(&node.key)
            },
        }
    }
}

/// Persistent storage and search for hierarchy nodes.
///
/// Re-submitting a node must be an idempotent upsert; a node that was once
/// written as a leaf stays a leaf.
#[async_trait::async_trait]
pub trait IndexDriver: Send + Sync {
    /// Driver name for logs.
    fn name(&self) -> &'static str;

    /// Connect and provision the storage namespace if it is missing.
    async fn init(&self) -> Result<()>;

    /// Write hierarchy nodes.
    async fn update(&self, nodes: &[PathNode]) -> Result<()>;

    /// Return at most `limit` nodes selected by `filter`.
    async fn query(&self, filter: &NodeFilter, limit: usize) -> Result<Vec<PathNode>>;

    /// Verify the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Release backend resources.
    async fn close(&self) -> Result<()>;
}

/// Builds a driver from its URL.
pub type DriverFactory = fn(&Url, &IndexConfig) -> Result<Arc<dyn IndexDriver>>;

/// Explicit mapping from URL scheme to driver factory.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the drivers shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register("elasticsearch", super::elasticsearch::ElasticsearchDriver::factory)
            .register("es", super::elasticsearch::ElasticsearchDriver::factory)
            .register("memory", super::memory::MemoryDriver::factory);
        registry
    }

    /// Add or replace the factory for `scheme`.
    pub fn register<S: Into<String>>(&mut self, scheme: S, factory: DriverFactory) -> &mut Self {
        self.factories.insert(scheme.into(), factory);
        self
    }

    /// Registered schemes in sorted order.
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the driver selected by the URL scheme.
    pub fn create(&self, url: &Url, config: &IndexConfig) -> Result<Arc<dyn IndexDriver>> {
        let factory = self
            .factories
            .get(url.scheme())
            .ok_or_else(|| QuarryError::UnknownDriver(url.scheme().to_string()))?;
        factory(url, config)
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
