//! Hierarchy nodes derived from dotted metric paths.

use serde::{Deserialize, Serialize};

/// One prefix of a metric path.
///
/// `a.b.c` is recorded as three nodes: `a` (depth 0), `a.b` (depth 1) and
/// the leaf `a.b.c` (depth 2).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathNode {
    /// Full dotted prefix
    pub key: String,
    /// Segment count minus one
    pub depth: usize,
    /// True only for a complete metric path
    pub leaf: bool,
}

impl PathNode {
    /// Create a node.
    pub fn new<S: Into<String>>(key: S, depth: usize, leaf: bool) -> Self {
        Self {
            key: key.into(),
            depth,
            leaf,
        }
    }

    /// Branch node for a browse prefix.
    pub fn branch(prefix: &str) -> Self {
        Self::new(prefix, depth_of(prefix), false)
    }

    /// Every prefix of `path`, longest first. Only the first node is a leaf.
    pub fn decompose(path: &str) -> Vec<PathNode> {
        let mut nodes = Vec::with_capacity(depth_of(path) + 1);
        nodes.push(PathNode::new(path, depth_of(path), true));

        let mut prefix = path;
        while let Some(end) = prefix.rfind('.') {
            prefix = &prefix[..end];
            nodes.push(PathNode::new(prefix, depth_of(prefix), false));
        }
        nodes
    }

    /// True when this node sits directly below `parent`.
    /// An empty parent names the root, whose children are the depth 0 nodes.
    pub fn is_child_of(&self, parent: &str) -> bool {
        if parent.is_empty() {
            return self.depth == 0;
        }
        self.depth == depth_of(parent) + 1
            && self
                .key
                .strip_prefix(parent)
                .map_or(false, |rest| rest.starts_with('.'))
    }
}

/// Depth of a dotted path: its number of separators.
pub fn depth_of(path: &str) -> usize {
    path.bytes().filter(|&b| b == b'.').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decompose_three_segments() {
        assert_eq!(
            PathNode::decompose("a.b.c"),
            vec![
                PathNode::new("a.b.c", 2, true),
                PathNode::new("a.b", 1, false),
                PathNode::new("a", 0, false),
            ]
        );
    }

    #[test]
    fn test_decompose_single_segment() {
        assert_eq!(PathNode::decompose("uptime"), vec![PathNode::new("uptime", 0, true)]);
    }

    #[test]
    fn test_decompose_depth_strictly_decreasing() {
        let nodes = PathNode::decompose("servers.web1.cpu.user.total");
        assert_eq!(nodes.len(), 5);
        assert!(nodes.windows(2).all(|w| w[0].depth == w[1].depth + 1));
        assert_eq!(nodes.iter().filter(|n| n.leaf).count(), 1);
    }

    #[test]
    fn test_is_child_of() {
        let node = PathNode::new("a.b.c", 2, true);
        assert!(node.is_child_of("a.b"));
        assert!(!node.is_child_of("a"));
        assert!(!node.is_child_of("a.bb"));
        assert!(!PathNode::new("a.bc.d", 2, true).is_child_of("a.b"));
        assert!(PathNode::new("a", 0, false).is_child_of(""));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(PathNode::new("a.b", 1, false)).unwrap();
        assert_eq!(json, serde_json::json!({"key": "a.b", "depth": 1, "leaf": false}));
    }
}
