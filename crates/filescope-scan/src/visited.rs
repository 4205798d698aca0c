//! Visited-directory tracking for symlink loop detection.

use std::path::{Path, PathBuf};

use dashmap::DashSet;

/// Tracks the canonical path of every directory entered by a scan.
///
/// With symlinks followed, the same directory can be reached through several
/// paths, including through a link back to one of its own ancestors. The
/// scanner only descends into a directory the first time its canonical path
/// is seen.
#[derive(Debug, Default)]
pub struct VisitedDirs {
    seen: DashSet<PathBuf>,
}

impl VisitedDirs {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
        }
    }

    /// Track a canonical directory path. Returns `true` if this is the first
    /// time seeing it.
    pub fn track(&self, canonical: PathBuf) -> bool {
        self.seen.insert(canonical)
    }

    /// Check if a directory has been seen (without tracking).
    pub fn has_seen(&self, canonical: &Path) -> bool {
        self.seen.contains(canonical)
    }

    /// Get the number of directories tracked.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if no directories have been tracked.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
