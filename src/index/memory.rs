//! In-process index driver backed by an ordered map.

use super::driver::{IndexDriver, NodeFilter};
use super::node::PathNode;
use crate::core::config::IndexConfig;
use crate::core::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// Keeps every node in memory, ordered by key. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    nodes: RwLock<BTreeMap<String, PathNode>>,
}

impl MemoryDriver {
    /// Create an empty driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry factory for `memory://` URLs.
    pub fn factory(_url: &Url, _config: &IndexConfig) -> Result<Arc<dyn IndexDriver>> {
        Ok(Arc::new(Self::new()))
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// True when nothing has been indexed.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

#[async_trait::async_trait]
impl IndexDriver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn update(&self, nodes: &[PathNode]) -> Result<()> {
        let mut map = self.nodes.write();
        for node in nodes {
            map.entry(node.key.clone())
                .and_modify(|existing| existing.leaf |= node.leaf)
                .or_insert_with(|| node.clone());
        }
        Ok(())
    }

    async fn query(&self, filter: &NodeFilter, limit: usize) -> Result<Vec<PathNode>> {
        let map = self.nodes.read();
        let nodes = match filter {
            // Children share the `parent.` key prefix, so a range scan suffices.
            NodeFilter::Children { parent } if !parent.is_empty() => {
                let start = format!("{}.", parent);
                map.range(start.clone()..)
                    .take_while(|(key, _)| key.starts_with(&start))
                    .map(|(_, node)| node)
                    .filter(|node| filter.accepts(node))
                    .take(limit)
                    .cloned()
                    .collect()
            },
            _ => map
                .values()
                .filter(|node| filter.accepts(node))
                .take(limit)
                .cloned()
                .collect(),
        };
        Ok(nodes)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_glob;

    #[tokio::test]
    async fn test_leaf_flag_survives_branch_upsert() {
        let driver = MemoryDriver::new();
        driver.update(&PathNode::decompose("a.b")).await.unwrap();
        driver.update(&PathNode::decompose("a.b.c")).await.unwrap();

        let leaves = driver
            .query(&NodeFilter::Leaves(parse_glob("a.b").unwrap()), 10)
            .await
            .unwrap();
        assert_eq!(leaves, vec![PathNode::new("a.b", 1, true)]);
        assert_eq!(driver.len(), 3);
    }

    #[tokio::test]
    async fn test_children_range_scan() {
        let driver = MemoryDriver::new();
        for path in ["a.b.c", "a.b.d", "a.bc.e", "a.b", "b.x"] {
            driver.update(&PathNode::decompose(path)).await.unwrap();
        }

        let children = driver
            .query(&NodeFilter::Children { parent: "a.b".into() }, 10)
            .await
            .unwrap();
        let keys: Vec<&str> = children.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["a.b.c", "a.b.d"]);

        let roots = driver
            .query(&NodeFilter::Children { parent: String::new() }, 10)
            .await
            .unwrap();
        let keys: Vec<&str> = roots.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_limit() {
        let driver = MemoryDriver::new();
        for i in 0..20 {
            driver.update(&PathNode::decompose(&format!("m.{}", i))).await.unwrap();
        }
        let leaves = driver
            .query(&NodeFilter::Leaves(parse_glob("m.*").unwrap()), 5)
            .await
            .unwrap();
        assert_eq!(leaves.len(), 5);
    }
}
