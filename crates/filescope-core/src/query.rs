//! Read and annotate operations on a tree.
//!
//! Paths passed here must already be normalized. None of these functions
//! touch the dependency graph; recomputation lives in `filescope-analyze`.

use std::path::{Path, PathBuf};

use crate::error::NodeNotFound;
use crate::node::FileNode;
use crate::tree::FileTree;

/// Look up a node.
pub fn get_node<'a>(tree: &'a FileTree, path: &Path) -> Option<&'a FileNode> {
    tree.get(path)
}

/// All files of the tree, in tree order.
pub fn list_all(tree: &FileTree) -> Vec<&FileNode> {
    tree.root.files().collect()
}

/// Set or clear the summary of a node.
pub fn set_summary(
    tree: &mut FileTree,
    path: &Path,
    text: Option<String>,
) -> Result<(), NodeNotFound> {
    let node = tree.get_mut(path).ok_or_else(|| NodeNotFound::new(path))?;
    node.summary = text.filter(|t| !t.trim().is_empty());
    Ok(())
}

/// Set the importance of a node, clamped to `[0, 10]`.
pub fn set_importance(tree: &mut FileTree, path: &Path, value: f64) -> Result<(), NodeNotFound> {
    let node = tree.get_mut(path).ok_or_else(|| NodeNotFound::new(path))?;
    node.importance = clamp_importance(value);
    Ok(())
}

/// Files the node at `path` depends on.
pub fn dependencies_of(tree: &FileTree, path: &Path) -> Result<Vec<PathBuf>, NodeNotFound> {
    let node = tree.get(path).ok_or_else(|| NodeNotFound::new(path))?;
    Ok(node.dependencies.iter().cloned().collect())
}

/// Files depending on the node at `path`.
pub fn dependents_of(tree: &FileTree, path: &Path) -> Result<Vec<PathBuf>, NodeNotFound> {
    let node = tree.get(path).ok_or_else(|| NodeNotFound::new(path))?;
    Ok(node.dependents.iter().cloned().collect())
}

/// Clamp a score into `[0, 10]`; NaN maps to 0.
pub fn clamp_importance(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 10.0)
    }
}
