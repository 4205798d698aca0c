//! Error types for persistence and engine operations.

use std::path::PathBuf;

use filescope_core::{NodeNotFound, ScanError};
use thiserror::Error;

/// Failures reading or writing persisted trees.
#[derive(Debug, Error)]
pub enum PersistError {
    /// No document with this name exists in the store.
    #[error("No saved tree named '{filename}'")]
    NotFound { filename: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize tree: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The document parsed badly or describes an inconsistent tree.
    #[error("Invalid tree document {path}: {message}")]
    Validation { path: PathBuf, message: String },

    #[error("Invalid tree name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

impl PersistError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn validation(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Failures of an engine operation. The active tree is left untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Node not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Path is outside the project root: {path}")]
    OutsideRoot { path: PathBuf },

    #[error("Path is excluded: {path}")]
    Excluded { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("The tree root cannot be removed: {path}")]
    RootNode { path: PathBuf },

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Tree '{filename}' is active and cannot be deleted")]
    ActiveTree { filename: String },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Tree state lock poisoned")]
    Poisoned,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("No async runtime available: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}

impl From<NodeNotFound> for EngineError {
    fn from(err: NodeNotFound) -> Self {
        Self::NotFound { path: err.path }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_path() {
        let err = EngineError::from(NodeNotFound::new("/p/a.ts"));
        assert_eq!(err.to_string(), "Node not found: /p/a.ts");

        let err = EngineError::from(PersistError::validation("/s/t.json", "missing field"));
        assert_eq!(err.to_string(), "Invalid tree document /s/t.json: missing field");
    }
}
