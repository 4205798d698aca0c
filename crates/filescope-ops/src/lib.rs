//! Tree ownership for filescope: persistence, incremental edits and live
//! watching.
//!
//! The [`Engine`] holds the active tree and applies every change as a single
//! critical section that recomputes the dependency graph and saves the tree
//! before the change becomes visible:
//!
//! ```rust,no_run
//! use filescope_ops::{Engine, EngineOptions};
//!
//! # async fn run() -> Result<(), filescope_ops::EngineError> {
//! let engine = Engine::create("/path/to/project", "/path/to/store", EngineOptions::default())?;
//! engine.set_summary("src/main.ts", Some("Entry point".into()))?;
//!
//! for file in engine.important_files(Some(10), 0.0)? {
//!     println!("{:>5.2} {}", file.importance, file.path.display());
//! }
//!
//! let mut events = engine.subscribe();
//! engine.start_watching().await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod events;
mod mutate;
mod persist;
mod watcher;

pub use engine::{Engine, EngineOptions};
pub use error::{EngineError, EngineResult, PersistError};
pub use events::TreeEvent;
pub use mutate::{Mutator, NodeUpdate, UpdateOutcome, exclude_and_remove, remove_node};
pub use persist::{TreeStore, TreeSummary, tree_filename, validate};
pub use watcher::{
    Debouncer, FsChange, WatchHandle, WatchStatus, WatchTarget, classify, spawn as spawn_watcher,
};

// Re-export core types for convenience
pub use filescope_core::{FileNode, FileTree, TreeConfig, WatchConfig};
