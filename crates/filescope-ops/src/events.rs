//! Change notifications published by the engine.

use std::path::PathBuf;

/// Something that changed in the active tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// A node entered the tree.
    NodeAdded(PathBuf),
    /// A node left the tree.
    NodeRemoved(PathBuf),
    /// A node's summary, importance or dependencies changed.
    NodeUpdated(PathBuf),
    /// Dependents and importance were recomputed.
    Recalculated,
    /// The tree was replaced by a fresh scan, a load or a switch.
    Rebuilt,
    /// The watcher stopped registering new directories.
    WatchLimitReached { limit: usize },
}

impl TreeEvent {
    /// Path the event is about, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::NodeAdded(p) | Self::NodeRemoved(p) | Self::NodeUpdated(p) => Some(p),
            Self::Recalculated | Self::Rebuilt | Self::WatchLimitReached { .. } => None,
        }
    }
}

/// Capacity of the broadcast channel behind [`crate::Engine::subscribe`].
pub(crate) const EVENT_CAPACITY: usize = 256;
