//! Mapping specifiers onto files under the tree root.

use std::path::{Path, PathBuf};

use filescope_core::UnresolvedReason;
use filescope_core::path::{is_within, normalize};

use super::Resolution;

/// Roots a reference is resolved against.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
    /// Root of the tree; resolved files must lie under it.
    pub root: &'a Path,
    /// Root used for root-relative specifiers (`/x`, absolute modules).
    pub project_root: &'a Path,
}

impl<'a> ExtractContext<'a> {
    /// Context where the project root equals the tree root.
    pub fn new(root: &'a Path) -> Self {
        Self {
            root,
            project_root: root,
        }
    }

    /// Context with a distinct project root.
    pub fn with_project_root(root: &'a Path, project_root: &'a Path) -> Self {
        Self { root, project_root }
    }
}

/// Try each candidate in order; the first existing file wins.
///
/// A candidate that exists outside the root yields `OutsideRoot`; when none
/// exists the reference is `Missing`.
pub(crate) fn first_existing(
    candidates: impl IntoIterator<Item = PathBuf>,
    ctx: &ExtractContext<'_>,
) -> Resolution {
    let mut outside = false;
    for candidate in candidates {
        let candidate = normalize(&candidate, ctx.root);
        if !candidate.is_file() {
            continue;
        }
        if is_within(&candidate, ctx.root) {
            return Resolution::Resolved(candidate);
        }
        outside = true;
    }
    if outside {
        Resolution::Unresolved(UnresolvedReason::OutsideRoot)
    } else {
        Resolution::Unresolved(UnresolvedReason::Missing)
    }
}

/// Resolve a relative specifier against `base_dir`, trying `suffixes` on the
/// joined path in order (an empty suffix means the path itself).
pub(crate) fn relative(
    base_dir: &Path,
    specifier: &str,
    suffixes: &[&str],
    ctx: &ExtractContext<'_>,
) -> Resolution {
    let target = normalize(specifier, base_dir);
    if !is_within(&target, ctx.root) {
        return Resolution::Unresolved(UnresolvedReason::OutsideRoot);
    }
    first_existing(with_suffixes(&target, suffixes), ctx)
}

/// `path` with each suffix appended to its final component.
pub(crate) fn with_suffixes(path: &Path, suffixes: &[&str]) -> Vec<PathBuf> {
    suffixes
        .iter()
        .map(|suffix| {
            if suffix.is_empty() {
                path.to_path_buf()
            } else {
                let mut raw = path.as_os_str().to_owned();
                raw.push(suffix);
                PathBuf::from(raw)
            }
        })
        .collect()
}

/// Directory containing `file`.
pub(crate) fn parent_dir(file: &Path) -> &Path {
    file.parent().unwrap_or(file)
}
