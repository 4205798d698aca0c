//! File and directory node types.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::path::{is_within, paths_equal};

/// Why a reference could not be mapped onto a file of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnresolvedReason {
    /// A package, module or system header outside the project.
    External,
    /// The reference resolves to a path outside the tree root.
    OutsideRoot,
    /// The reference looks local but no matching file exists.
    Missing,
}

/// A reference kept for diagnostics only; never part of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedReference {
    /// The specifier exactly as written in the source.
    pub specifier: String,
    /// 1-based line of the reference.
    pub line: usize,
    /// Classification of the failure.
    pub reason: UnresolvedReason,
}

/// A single file or directory in the tree.
///
/// Children are owned by their parent. Dependency edges are stored as
/// normalized paths and resolved by lookup, so the dependency overlay may be
/// cyclic while containment never is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    /// Normalized absolute path; unique within a tree.
    pub path: PathBuf,

    /// File/directory name (not full path).
    pub name: CompactString,

    /// Whether this node is a directory.
    pub is_directory: bool,

    /// Children nodes (directories only), sorted by name.
    pub children: Vec<FileNode>,

    /// Files this file references.
    pub dependencies: BTreeSet<PathBuf>,

    /// Files referencing this file. Derived, never set directly.
    pub dependents: BTreeSet<PathBuf>,

    /// References that did not resolve to a file in the tree.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<UnresolvedReference>,

    /// Importance score in `[0, 10]`.
    pub importance: f64,

    /// Caller-supplied annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Modification time observed when dependencies were last extracted.
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileNode {
    fn with_kind(path: PathBuf, is_directory: bool) -> Self {
        let name = display_name(&path);
        Self {
            path,
            name,
            is_directory,
            children: Vec::new(),
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            unresolved: Vec::new(),
            importance: 0.0,
            summary: None,
            last_modified: None,
        }
    }

    /// Create a new file node.
    pub fn new_file(path: impl Into<PathBuf>, last_modified: Option<DateTime<Utc>>) -> Self {
        let mut node = Self::with_kind(path.into(), false);
        node.last_modified = last_modified;
        node
    }

    /// Create a new directory node.
    pub fn new_directory(path: impl Into<PathBuf>) -> Self {
        Self::with_kind(path.into(), true)
    }

    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.is_directory
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        !self.is_directory
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Number of files in this subtree (1 for a file).
    pub fn file_count(&self) -> usize {
        self.iter().filter(|n| n.is_file()).count()
    }

    /// Number of directories below this node.
    pub fn dir_count(&self) -> usize {
        self.iter().skip(1).filter(|n| n.is_dir()).count()
    }

    /// Pre-order iterator over this node and all descendants, in tree order.
    pub fn iter(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }

    /// Iterator over the files of this subtree, in tree order.
    pub fn files(&self) -> impl Iterator<Item = &FileNode> {
        self.iter().filter(|n| n.is_file())
    }

    /// Apply `f` to every node of this subtree.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut FileNode)) {
        let mut stack: Vec<&mut FileNode> = vec![self];
        while let Some(node) = stack.pop() {
            f(&mut *node);
            stack.extend(node.children.iter_mut());
        }
    }

    /// Find the node at `path` in this subtree.
    pub fn find(&self, path: &Path) -> Option<&FileNode> {
        let mut current = self;
        loop {
            if paths_equal(&current.path, path) {
                return Some(current);
            }
            if !current.is_directory || !is_within(path, &current.path) {
                return None;
            }
            current = current
                .children
                .iter()
                .find(|c| is_within(path, &c.path))?;
        }
    }

    /// Find the node at `path` in this subtree, mutably.
    pub fn find_mut(&mut self, path: &Path) -> Option<&mut FileNode> {
        if paths_equal(&self.path, path) {
            return Some(self);
        }
        if !self.is_directory || !is_within(path, &self.path) {
            return None;
        }
        self.children
            .iter_mut()
            .find(|c| is_within(path, &c.path))?
            .find_mut(path)
    }

    /// Check whether `path` exists in this subtree.
    pub fn contains(&self, path: &Path) -> bool {
        self.find(path).is_some()
    }

    /// Insert a direct child in name order, replacing a child of the same name.
    pub fn insert_child(&mut self, child: FileNode) -> &mut FileNode {
        match self.children.binary_search_by(|c| c.name.cmp(&child.name)) {
            Ok(idx) => {
                self.children[idx] = child;
                &mut self.children[idx]
            }
            Err(idx) => {
                self.children.insert(idx, child);
                &mut self.children[idx]
            }
        }
    }

    /// Detach the descendant at `path`. The node itself cannot be detached.
    pub fn remove_descendant(&mut self, path: &Path) -> Option<FileNode> {
        if paths_equal(&self.path, path) || !is_within(path, &self.path) {
            return None;
        }
        if let Some(idx) = self.children.iter().position(|c| paths_equal(&c.path, path)) {
            return Some(self.children.remove(idx));
        }
        self.children
            .iter_mut()
            .find(|c| c.is_directory && is_within(path, &c.path))?
            .remove_descendant(path)
    }

    /// Sort children by name, recursively.
    pub fn sort_children(&mut self) {
        self.for_each_mut(|node| node.children.sort_by(|a, b| a.name.cmp(&b.name)));
    }
}

/// Pre-order iterator over a subtree.
pub struct Iter<'a> {
    stack: Vec<&'a FileNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a FileNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Last path component used as a display name.
pub fn display_name(path: &Path) -> CompactString {
    path.file_name()
        .map(|n| CompactString::new(n.to_string_lossy()))
        .unwrap_or_else(|| CompactString::new(path.to_string_lossy()))
}

/// Modification time of a metadata record as UTC.
pub fn modified_time(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileNode {
        let mut root = FileNode::new_directory("/p");
        let mut src = FileNode::new_directory("/p/src");
        src.insert_child(FileNode::new_file("/p/src/b.ts", None));
        src.insert_child(FileNode::new_file("/p/src/a.ts", None));
        root.insert_child(src);
        root.insert_child(FileNode::new_file("/p/README.md", None));
        root
    }

    #[test]
    fn test_file_node_creation() {
        let node = FileNode::new_file("/p/test.txt", None);
        assert!(node.is_file());
        assert!(!node.is_dir());
        assert_eq!(node.name.as_str(), "test.txt");
        assert_eq!(node.importance, 0.0);
    }

    #[test]
    fn test_insert_keeps_name_order() {
        let root = sample();
        let names: Vec<_> = root.iter().map(|n| n.name.to_string()).collect();
        assert_eq!(names, vec!["p", "README.md", "src", "a.ts", "b.ts"]);
    }

    #[test]
    fn test_find_and_counts() {
        let root = sample();
        assert!(root.find(Path::new("/p/src/a.ts")).is_some());
        assert!(root.find(Path::new("/p/src/c.ts")).is_none());
        assert!(root.find(Path::new("/q")).is_none());
        assert_eq!(root.file_count(), 3);
        assert_eq!(root.dir_count(), 1);
    }

    #[test]
    fn test_remove_descendant() {
        let mut root = sample();
        let removed = root.remove_descendant(Path::new("/p/src/a.ts")).unwrap();
        assert_eq!(removed.name.as_str(), "a.ts");
        assert!(!root.contains(Path::new("/p/src/a.ts")));
        assert!(root.remove_descendant(Path::new("/p")).is_none());
    }
}
