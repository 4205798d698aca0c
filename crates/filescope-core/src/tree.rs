//! File tree container and statistics.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::TreeConfig;
use crate::node::FileNode;

/// Summary statistics for a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Total number of files.
    pub total_files: u64,
    /// Total number of directories, excluding the root.
    pub total_dirs: u64,
    /// Number of dependency edges, dangling ones included.
    pub total_edges: u64,
    /// Number of references that did not resolve.
    pub unresolved_references: u64,
    /// Maximum depth reached.
    pub max_depth: u32,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a file entry.
    pub fn record_file(&mut self, node: &FileNode, depth: u32) {
        self.total_files += 1;
        self.total_edges += node.dependencies.len() as u64;
        self.unresolved_references += node.unresolved.len() as u64;
        self.max_depth = self.max_depth.max(depth);
    }

    /// Record a directory.
    pub fn record_dir(&mut self, depth: u32) {
        self.total_dirs += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    /// Compute statistics for a subtree.
    pub fn collect(root: &FileNode) -> Self {
        let mut stats = Self::new();
        let mut stack = vec![(root, 0u32)];
        while let Some((node, depth)) = stack.pop() {
            if node.is_file() {
                stats.record_file(node, depth);
                continue;
            }
            if depth > 0 {
                stats.record_dir(depth);
            }
            stack.extend(node.children.iter().map(|c| (c, depth + 1)));
        }
        stats
    }
}

/// A tree together with the configuration it is persisted with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTree {
    /// Persisted configuration.
    pub config: TreeConfig,

    /// Root node of the tree.
    #[serde(rename = "fileTree")]
    pub root: FileNode,
}

impl FileTree {
    /// Create a new file tree.
    pub fn new(config: TreeConfig, root: FileNode) -> Self {
        Self { config, root }
    }

    /// Root path of the tree.
    pub fn root_path(&self) -> &Path {
        &self.root.path
    }

    /// Look up a node by normalized path.
    pub fn get(&self, path: &Path) -> Option<&FileNode> {
        self.root.find(path)
    }

    /// Look up a node by normalized path, mutably.
    pub fn get_mut(&mut self, path: &Path) -> Option<&mut FileNode> {
        self.root.find_mut(path)
    }

    /// Summary statistics.
    pub fn stats(&self) -> TreeStats {
        TreeStats::collect(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_stats_default() {
        let stats = TreeStats::default();
        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.total_dirs, 0);
    }

    #[test]
    fn test_tree_stats_collect() {
        let mut root = FileNode::new_directory("/p");
        let mut src = FileNode::new_directory("/p/src");
        let mut a = FileNode::new_file("/p/src/a.ts", None);
        a.dependencies.insert("/p/src/b.ts".into());
        src.insert_child(a);
        src.insert_child(FileNode::new_file("/p/src/b.ts", None));
        root.insert_child(src);

        let stats = TreeStats::collect(&root);
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_dirs, 1);
        assert_eq!(stats.total_edges, 1);
        assert_eq!(stats.max_depth, 2);
    }
}
