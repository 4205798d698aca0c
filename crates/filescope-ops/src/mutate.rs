//! Incremental edits to a tree.
//!
//! These functions edit the tree structure and the per-file extraction
//! results only. Dependents and importance are left stale; the engine
//! recomputes them after every structural change.

use std::fs;
use std::path::{Component, Path, PathBuf};

use filescope_analyze::{DependencyExtractor, ExtractContext, strip_path};
use filescope_core::path::{is_within, normalize, paths_equal, relative_to};
use filescope_core::query::clamp_importance;
use filescope_core::{ExcludeRules, FileNode, FileTree, modified_time};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// Changes applied by [`Mutator::update_node`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    /// `Some(None)` clears the summary.
    pub summary: Option<Option<String>>,
    /// New importance, clamped to `[0, 10]`.
    pub importance: Option<f64>,
    /// Re-extract dependencies when the file changed on disk.
    pub refresh: bool,
}

impl NodeUpdate {
    /// An update that only re-extracts dependencies.
    pub fn refresh() -> Self {
        Self {
            refresh: true,
            ..Self::default()
        }
    }
}

/// What [`Mutator::update_node`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The file was read again.
    pub refreshed: bool,
    /// Its dependency set differs from before.
    pub graph_changed: bool,
}

/// Adds and refreshes nodes, extracting dependencies as it goes.
pub struct Mutator<'a> {
    extractor: &'a DependencyExtractor,
    rules: &'a ExcludeRules,
    ignored: Option<&'a Path>,
}

impl<'a> Mutator<'a> {
    pub fn new(extractor: &'a DependencyExtractor, rules: &'a ExcludeRules) -> Self {
        Self {
            extractor,
            rules,
            ignored: None,
        }
    }

    /// Never add `path`; used for the persisted document.
    pub fn ignoring(mut self, path: &'a Path) -> Self {
        self.ignored = Some(path);
        self
    }

    fn skips(&self, path: &Path) -> bool {
        self.rules.is_excluded(path) || self.ignored.is_some_and(|p| paths_equal(p, path))
    }

    /// Add the file or directory at `path`, creating missing ancestors.
    ///
    /// A directory brings in everything below it that is not excluded. Adding
    /// a file already in the tree re-extracts it. Returns the newly inserted
    /// paths.
    pub fn add_node(&self, tree: &mut FileTree, path: &Path) -> EngineResult<Vec<PathBuf>> {
        let root_path = tree.root.path.clone();
        let path = normalize(path, &root_path);
        if !is_within(&path, &root_path) {
            return Err(EngineError::OutsideRoot { path });
        }
        let metadata = fs::metadata(&path).map_err(|e| EngineError::io(&path, e))?;
        if !paths_equal(&path, &root_path) && self.skips(&path) {
            return Err(EngineError::Excluded { path });
        }

        for ancestor in path.ancestors().skip(1) {
            if !is_within(ancestor, &root_path) || paths_equal(ancestor, &root_path) {
                break;
            }
            replace_mismatched(tree, ancestor, true)?;
        }
        if !paths_equal(&path, &root_path) {
            replace_mismatched(tree, &path, metadata.is_dir())?;
        }

        let project_root = tree.config.project_root.clone();
        let ctx = ExtractContext::with_project_root(&root_path, &project_root);
        let mut added = Vec::new();

        if metadata.is_dir() {
            let dir = ensure_directory(&mut tree.root, &path, &mut added);
            self.fill_directory(dir, &ctx, &mut added);
        } else {
            let parent = path.parent().unwrap_or(&root_path).to_path_buf();
            let dir = ensure_directory(&mut tree.root, &parent, &mut added);
            let mut node = match dir.children.iter().position(|c| paths_equal(&c.path, &path)) {
                Some(idx) if !dir.children[idx].is_directory => dir.children.remove(idx),
                _ => {
                    added.push(path.clone());
                    FileNode::new_file(&path, None)
                }
            };
            node.last_modified = modified_time(&metadata);
            self.extract_into(&mut node, &ctx);
            dir.insert_child(node);
        }

        debug!(path = %path.display(), added = added.len(), "added node");
        Ok(added)
    }

    /// Apply `update` to the node at `path`.
    pub fn update_node(
        &self,
        tree: &mut FileTree,
        path: &Path,
        update: &NodeUpdate,
    ) -> EngineResult<UpdateOutcome> {
        let root_path = tree.root.path.clone();
        let project_root = tree.config.project_root.clone();
        let path = normalize(path, &root_path);
        let node = tree
            .root
            .find_mut(&path)
            .ok_or_else(|| EngineError::NotFound { path: path.clone() })?;

        if let Some(summary) = &update.summary {
            node.summary = summary.clone().filter(|s| !s.trim().is_empty());
        }
        if let Some(importance) = update.importance {
            node.importance = clamp_importance(importance);
        }

        let mut outcome = UpdateOutcome::default();
        if update.refresh && node.is_file() {
            let metadata = fs::metadata(&path).map_err(|e| EngineError::io(&path, e))?;
            let modified = modified_time(&metadata);
            if modified.is_some() && modified == node.last_modified {
                debug!(path = %path.display(), "unchanged since last extraction");
                return Ok(outcome);
            }
            let ctx = ExtractContext::with_project_root(&root_path, &project_root);
            node.last_modified = modified;
            outcome.refreshed = true;
            outcome.graph_changed = self.extract_into(node, &ctx);
        }
        Ok(outcome)
    }

    /// Re-extract `node`, reporting whether its dependency set changed.
    fn extract_into(&self, node: &mut FileNode, ctx: &ExtractContext<'_>) -> bool {
        match self.extractor.extract_file(&node.path, ctx) {
            Ok(extraction) => extraction.apply_to(node),
            Err(e) => {
                warn!(path = %e.path().display(), error = %e, "dependency extraction failed");
                let changed = !node.dependencies.is_empty();
                node.dependencies.clear();
                node.unresolved.clear();
                changed
            }
        }
    }

    /// Insert whatever lies below `dir` on disk and is missing from the tree.
    fn fill_directory(&self, dir: &mut FileNode, ctx: &ExtractContext<'_>, added: &mut Vec<PathBuf>) {
        let entries = match fs::read_dir(&dir.path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %dir.path.display(), error = %e, "cannot read directory");
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if self.skips(&path) {
                continue;
            }
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            // Symlinked directories are not followed.
            let is_dir = if file_type.is_symlink() {
                match fs::metadata(&path) {
                    Ok(meta) if meta.is_dir() => continue,
                    Ok(_) => false,
                    Err(_) => {
                        warn!(path = %path.display(), "skipping broken symlink");
                        continue;
                    }
                }
            } else {
                file_type.is_dir()
            };

            let existing = dir.children.iter().position(|c| paths_equal(&c.path, &path));
            match (existing, is_dir) {
                (Some(idx), true) if dir.children[idx].is_directory => {
                    self.fill_directory(&mut dir.children[idx], ctx, added);
                }
                (Some(_), false) => {}
                (_, true) => {
                    let mut child = FileNode::new_directory(&path);
                    added.push(path);
                    self.fill_directory(&mut child, ctx, added);
                    dir.insert_child(child);
                }
                (None, false) => {
                    let modified = entry.metadata().ok().and_then(|m| modified_time(&m));
                    let mut child = FileNode::new_file(&path, modified);
                    self.extract_into(&mut child, ctx);
                    added.push(path);
                    dir.insert_child(child);
                }
            }
        }
    }
}

/// Directory node at `target`, creating it and its ancestors as needed.
/// Remove the node at `path` when it is not of the wanted kind, so that a
/// file turned directory (or the reverse) leaves no edges behind.
fn replace_mismatched(tree: &mut FileTree, path: &Path, want_dir: bool) -> EngineResult<()> {
    let mismatched = tree
        .root
        .find(path)
        .is_some_and(|node| node.is_directory != want_dir);
    if mismatched {
        let removed = remove_node(tree, path)?;
        debug!(path = %path.display(), removed = removed.len(), "replaced node of other kind");
    }
    Ok(())
}

fn ensure_directory<'t>(
    node: &'t mut FileNode,
    target: &Path,
    added: &mut Vec<PathBuf>,
) -> &'t mut FileNode {
    let next = relative_to(target, &node.path)
        .and_then(|rel| rel.components().next())
        .and_then(|c| match c {
            Component::Normal(part) => Some(node.path.join(part)),
            _ => None,
        });
    let Some(child_path) = next else {
        return node;
    };

    let existing = node
        .children
        .iter()
        .position(|c| paths_equal(&c.path, &child_path));
    let child = match existing {
        Some(idx) if node.children[idx].is_directory => &mut node.children[idx],
        _ => {
            added.push(child_path.clone());
            node.insert_child(FileNode::new_directory(child_path))
        }
    };
    ensure_directory(child, target, added)
}

/// Detach the node at `path` and strip it from every edge set.
///
/// Returns every path that left the tree.
pub fn remove_node(tree: &mut FileTree, path: &Path) -> EngineResult<Vec<PathBuf>> {
    let path = normalize(path, &tree.root.path);
    if paths_equal(&path, &tree.root.path) {
        return Err(EngineError::RootNode { path });
    }
    let detached = tree
        .root
        .remove_descendant(&path)
        .ok_or_else(|| EngineError::NotFound { path: path.clone() })?;
    strip_path(&mut tree.root, &detached.path);

    let removed: Vec<PathBuf> = detached.iter().map(|n| n.path.clone()).collect();
    debug!(path = %path.display(), removed = removed.len(), "removed node");
    Ok(removed)
}

/// Remove every node matching `pattern` and add it to the exclusion list.
pub fn exclude_and_remove(tree: &mut FileTree, pattern: &str) -> EngineResult<Vec<PathBuf>> {
    let pattern = pattern.trim().to_string();
    let rules = ExcludeRules::new(&tree.root.path, std::slice::from_ref(&pattern), false)
        .map_err(|source| EngineError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;

    // Only the top-most match of a subtree needs detaching.
    let mut matches = Vec::new();
    let mut stack: Vec<&FileNode> = tree.root.children.iter().collect();
    while let Some(node) = stack.pop() {
        if rules.is_excluded(&node.path) {
            matches.push(node.path.clone());
        } else {
            stack.extend(node.children.iter());
        }
    }
    matches.sort();

    let mut removed = Vec::new();
    for path in matches {
        removed.extend(remove_node(tree, &path)?);
    }
    if !tree.config.exclude_patterns.contains(&pattern) {
        tree.config.exclude_patterns.push(pattern);
    }
    Ok(removed)
}
