//! Tree documents on disk.
//!
//! A [`TreeStore`] owns one directory of JSON documents, one per tracked
//! tree. Saves go through a temporary file in the same directory and are
//! renamed over the target, so a reader never observes a partial document.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use filescope_core::path::normalize;
use filescope_core::{FileNode, FileTree, TreeConfig};
use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::PersistError;

const EXTENSION: &str = "json";

/// Header of a saved tree, as shown by [`TreeStore::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct TreeSummary {
    pub filename: String,
    pub base_directory: PathBuf,
    pub project_root: PathBuf,
    pub last_updated: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Header {
    config: TreeConfig,
}

/// Directory of persisted tree documents.
#[derive(Debug, Clone)]
pub struct TreeStore {
    dir: PathBuf,
}

impl TreeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the document named `filename`.
    pub fn path_for(&self, filename: &str) -> Result<PathBuf, PersistError> {
        Ok(self.dir.join(tree_filename(filename)?))
    }

    /// Write `tree` atomically under its configured filename.
    pub fn save(&self, tree: &FileTree) -> Result<PathBuf, PersistError> {
        let path = self.path_for(&tree.config.filename)?;
        fs::create_dir_all(&self.dir).map_err(|e| PersistError::io(&self.dir, e))?;

        let bytes = serde_json::to_vec_pretty(tree)?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| PersistError::io(&self.dir, e))?;
        tmp.write_all(&bytes).map_err(|e| PersistError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| PersistError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| PersistError::io(&path, e.error))?;

        debug!(path = %path.display(), bytes = bytes.len(), "saved tree");
        Ok(path)
    }

    /// Read and validate the document named `filename`.
    pub fn load(&self, filename: &str) -> Result<FileTree, PersistError> {
        let name = tree_filename(filename)?;
        let path = self.dir.join(&name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistError::NotFound { filename: name });
            }
            Err(e) => return Err(PersistError::io(&path, e)),
        };

        let mut tree: FileTree = serde_json::from_slice(&bytes)
            .map_err(|e| PersistError::validation(&path, e.to_string()))?;
        validate(&tree).map_err(|message| PersistError::validation(&path, message))?;
        tree.config.filename = name;

        info!(
            path = %path.display(),
            files = tree.root.file_count(),
            "loaded tree"
        );
        Ok(tree)
    }

    /// Summaries of every readable document in the store, sorted by name.
    pub fn list(&self) -> Result<Vec<TreeSummary>, PersistError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistError::io(&self.dir, e)),
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != EXTENSION) || !path.is_file() {
                continue;
            }
            let header = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<Header>(&bytes).map_err(|e| e.to_string())
                });
            match header {
                Ok(Header { config }) => summaries.push(TreeSummary {
                    filename: entry.file_name().to_string_lossy().into_owned(),
                    base_directory: config.base_directory,
                    project_root: config.project_root,
                    last_updated: config.last_updated,
                }),
                Err(message) => {
                    warn!(path = %path.display(), %message, "skipping unreadable tree document");
                }
            }
        }

        summaries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(summaries)
    }

    /// Delete the document named `filename`.
    pub fn delete(&self, filename: &str) -> Result<(), PersistError> {
        let name = tree_filename(filename)?;
        let path = self.dir.join(&name);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "deleted tree");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PersistError::NotFound { filename: name })
            }
            Err(e) => Err(PersistError::io(&path, e)),
        }
    }
}

/// Validate a tree document name and append `.json` when it is missing.
pub fn tree_filename(name: &str) -> Result<String, PersistError> {
    let invalid = |reason: &str| PersistError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("Name cannot be empty"));
    }
    if name.len() > 250 {
        return Err(invalid("Name is too long"));
    }
    for c in ['/', '\\', '\0'] {
        if name.contains(c) {
            return Err(invalid(&format!("Name cannot contain '{}'", c.escape_default())));
        }
    }
    if name.starts_with('.') || name.contains("..") {
        return Err(invalid("Name cannot start with '.' or contain '..'"));
    }
    if name.starts_with(' ') || name.ends_with(' ') {
        return Err(invalid("Name cannot start or end with spaces"));
    }

    let suffix = format!(".{EXTENSION}");
    if name.ends_with(&suffix) {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}{suffix}"))
    }
}

/// Structural checks on a freshly deserialized tree.
///
/// Returns a message naming the first offending path.
pub fn validate(tree: &FileTree) -> Result<(), String> {
    let root = &tree.root;
    if !root.is_directory {
        return Err(format!("root {} is not a directory", root.path.display()));
    }
    if root.path != tree.config.base_directory {
        return Err(format!(
            "root {} does not match baseDirectory {}",
            root.path.display(),
            tree.config.base_directory.display()
        ));
    }

    let mut seen = HashSet::new();
    let mut stack: Vec<&FileNode> = vec![root];
    while let Some(node) = stack.pop() {
        let path = &node.path;
        if !path.is_absolute() || normalize(path, path) != *path {
            return Err(format!("{} is not an absolute normalized path", path.display()));
        }
        if !seen.insert(path.as_path()) {
            return Err(format!("{} appears more than once", path.display()));
        }
        if !node.importance.is_finite() || !(0.0..=10.0).contains(&node.importance) {
            return Err(format!(
                "{} has importance {} outside [0, 10]",
                path.display(),
                node.importance
            ));
        }
        if !node.is_directory && !node.children.is_empty() {
            return Err(format!("file {} has children", path.display()));
        }
        for child in &node.children {
            if child.path.parent() != Some(path.as_path()) {
                return Err(format!(
                    "{} is not directly under {}",
                    child.path.display(),
                    path.display()
                ));
            }
            stack.push(child);
        }
    }
    Ok(())
}
