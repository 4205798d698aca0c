//! Importance scoring.
//!
//! A file's score is driven by how many other files depend on it, with its own
//! outgoing references as a tie-breaker:
//!
//! ```text
//! importance(f) = 0                                          if in(f) == 0
//!               = 10 * (in(f) + 0.5 * out(f) / maxOut) / maxIn   otherwise
//! ```
//!
//! clamped to `[0, 10]` and rounded to two decimals. A file nothing depends on
//! is a leaf and scores 0 however much it imports. Since the out term never
//! exceeds `0.5`, one more dependent always outranks any number of outgoing
//! edges, and only the files with the highest in-degree reach 10.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use filescope_core::FileNode;
use itertools::Itertools;
use tracing::debug;

/// Upper bound of the score range.
pub const MAX_IMPORTANCE: f64 = 10.0;

/// Highest score a file below the maximum in-degree may receive.
const BELOW_MAX: f64 = 9.99;

/// In- and out-degree of a file, counting only edges to other files present
/// in the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Degree {
    pub incoming: usize,
    pub outgoing: usize,
}

fn degree(node: &FileNode, files: &HashSet<&Path>) -> Degree {
    let counts = |set: &BTreeSet<PathBuf>| {
        set.iter()
            .filter(|p| p.as_path() != node.path.as_path() && files.contains(p.as_path()))
            .count()
    };
    Degree {
        incoming: counts(&node.dependents),
        outgoing: counts(&node.dependencies),
    }
}

/// Score a file of the given degree against the tree-wide maxima.
pub fn importance_for(degree: Degree, max_in: usize, max_out: usize) -> f64 {
    if max_in == 0 || degree.incoming == 0 {
        return 0.0;
    }
    let out_term = if max_out == 0 {
        0.0
    } else {
        0.5 * degree.outgoing as f64 / max_out as f64
    };
    let raw = MAX_IMPORTANCE * (degree.incoming as f64 + out_term) / max_in as f64;
    let rounded = (raw.clamp(0.0, MAX_IMPORTANCE) * 100.0).round() / 100.0;
    if degree.incoming < max_in {
        rounded.min(BELOW_MAX)
    } else {
        rounded
    }
}

/// Recompute the importance of every file in the tree. Directories are set
/// to 0.
///
/// Expects `dependents` to be current (see [`crate::build_dependents`]).
pub fn score(root: &mut FileNode) {
    let files: HashSet<&Path> = root.files().map(|n| n.path.as_path()).collect();
    let degrees: HashMap<PathBuf, Degree> = root
        .files()
        .map(|n| (n.path.clone(), degree(n, &files)))
        .collect();
    drop(files);

    let max_in = degrees.values().map(|d| d.incoming).max().unwrap_or(0);
    let max_out = degrees.values().map(|d| d.outgoing).max().unwrap_or(0);

    root.for_each_mut(|node| {
        node.importance = match degrees.get(&node.path) {
            Some(&degree) if node.is_file() => importance_for(degree, max_in, max_out),
            _ => 0.0,
        };
    });
    debug!(files = degrees.len(), max_in, max_out, "scored importance");
}

/// Display importance of a directory: the highest score among its files.
pub fn directory_importance(node: &FileNode) -> f64 {
    node.files().map(|n| n.importance).fold(0.0, f64::max)
}

/// Files ordered by importance (highest first, then by path), keeping those
/// at or above `min_importance`, truncated to `limit` when given.
pub fn ranked_files(root: &FileNode, limit: Option<usize>, min_importance: f64) -> Vec<&FileNode> {
    root.files()
        .filter(|n| n.importance >= min_importance)
        .sorted_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| a.path.cmp(&b.path))
        })
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_dependents;

    fn graph(edges: &[(&str, &str)], files: &[&str]) -> FileNode {
        let mut root = FileNode::new_directory("/p");
        for name in files {
            let path = PathBuf::from(format!("/p/{name}"));
            let mut node = FileNode::new_file(path, None);
            for (from, to) in edges {
                if from == name {
                    node.dependencies.insert(PathBuf::from(format!("/p/{to}")));
                }
            }
            root.insert_child(node);
        }
        build_dependents(&mut root);
        score(&mut root);
        root
    }

    fn importance(root: &FileNode, name: &str) -> f64 {
        root.find(&PathBuf::from(format!("/p/{name}")))
            .unwrap()
            .importance
    }

    #[test]
    fn test_single_edge() {
        let root = graph(&[("a.ts", "b.ts")], &["a.ts", "b.ts"]);
        assert_eq!(importance(&root, "b.ts"), 10.0);
        assert_eq!(importance(&root, "a.ts"), 0.0);
    }

    #[test]
    fn test_pure_importer_scores_zero() {
        let root = graph(
            &[("main.ts", "a.ts"), ("main.ts", "b.ts"), ("a.ts", "b.ts")],
            &["a.ts", "b.ts", "main.ts"],
        );
        assert_eq!(importance(&root, "main.ts"), 0.0);
        assert_eq!(importance(&root, "b.ts"), 10.0);
        assert!(importance(&root, "a.ts") > 0.0);
    }

    #[test]
    fn test_out_degree_only_breaks_ties() {
        let busy = Degree {
            incoming: 1,
            outgoing: 4,
        };
        let quiet = Degree {
            incoming: 1,
            outgoing: 0,
        };
        let more_dependents = Degree {
            incoming: 2,
            outgoing: 0,
        };
        assert!(importance_for(busy, 3, 4) > importance_for(quiet, 3, 4));
        assert!(importance_for(more_dependents, 3, 4) > importance_for(busy, 3, 4));
        assert_eq!(importance_for(Degree { incoming: 0, outgoing: 4 }, 3, 4), 0.0);
    }

    #[test]
    fn test_no_edges_scores_zero() {
        let root = graph(&[], &["a.ts", "b.ts"]);
        assert!(root.iter().all(|n| n.importance == 0.0));
    }

    #[test]
    fn test_self_edges_and_dangling_edges_ignored() {
        let root = graph(&[("a.ts", "a.ts"), ("a.ts", "gone.ts")], &["a.ts", "b.ts"]);
        assert_eq!(importance(&root, "a.ts"), 0.0);
        assert_eq!(importance(&root, "b.ts"), 0.0);
    }

    #[test]
    fn test_in_degree_dominates() {
        // hub has two dependents; leaf has one dependent but many dependencies
        let root = graph(
            &[
                ("x.ts", "hub.ts"),
                ("y.ts", "hub.ts"),
                ("leaf.ts", "x.ts"),
                ("y.ts", "leaf.ts"),
                ("leaf.ts", "z.ts"),
                ("leaf.ts", "w.ts"),
            ],
            &["hub.ts", "leaf.ts", "w.ts", "x.ts", "y.ts", "z.ts"],
        );
        assert_eq!(importance(&root, "hub.ts"), 10.0);
        assert!(importance(&root, "leaf.ts") < 10.0);
        assert!(importance(&root, "leaf.ts") > importance(&root, "x.ts"));
    }

    #[test]
    fn test_near_max_is_capped_below_ten() {
        let degree = Degree {
            incoming: 999,
            outgoing: 10,
        };
        assert_eq!(importance_for(degree, 1000, 10), BELOW_MAX);
    }

    #[test]
    fn test_directory_importance_and_ranking() {
        let mut root = graph(&[("a.ts", "b.ts"), ("c.ts", "b.ts")], &["a.ts", "b.ts", "c.ts"]);
        assert_eq!(root.importance, 0.0);
        assert_eq!(directory_importance(&root), 10.0);

        let ranked: Vec<_> = ranked_files(&root, Some(2), 0.0)
            .into_iter()
            .map(|n| n.name.to_string())
            .collect();
        assert_eq!(ranked, vec!["b.ts", "a.ts"]);
        assert!(ranked_files(&root, None, 6.0).len() == 1);

        root.children.clear();
        assert_eq!(directory_importance(&root), 0.0);
    }
}
