//! Reverse edges of the dependency overlay.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use filescope_core::FileNode;
use filescope_core::path::is_within;
use tracing::debug;

/// Rebuild every node's `dependents` as the transpose of all `dependencies`
/// edges whose target is a file of the tree.
///
/// Self-references appear in both sets. Edges to paths missing from the tree
/// stay in `dependencies` only. Running it twice yields the same tree.
pub fn build_dependents(root: &mut FileNode) {
    let files: HashSet<&Path> = root.files().map(|n| n.path.as_path()).collect();

    let mut reverse: HashMap<PathBuf, BTreeSet<PathBuf>> = HashMap::new();
    let mut edges = 0usize;
    for node in root.files() {
        for target in &node.dependencies {
            if files.contains(target.as_path()) {
                reverse
                    .entry(target.clone())
                    .or_default()
                    .insert(node.path.clone());
                edges += 1;
            }
        }
    }

    root.for_each_mut(|node| {
        node.dependents = reverse.remove(&node.path).unwrap_or_default();
    });
    debug!(edges, "rebuilt dependents");
}

/// Remove `path` and every path below it from all `dependencies` and
/// `dependents` sets.
pub fn strip_path(root: &mut FileNode, path: &Path) {
    root.for_each_mut(|node| {
        node.dependencies.retain(|p| !is_within(p, path));
        node.dependents.retain(|p| !is_within(p, path));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, deps: &[&str]) -> FileNode {
        let mut node = FileNode::new_file(path, None);
        node.dependencies = deps.iter().map(PathBuf::from).collect();
        node
    }

    fn tree() -> FileNode {
        let mut root = FileNode::new_directory("/p");
        let mut src = FileNode::new_directory("/p/src");
        src.insert_child(file("/p/src/a.ts", &["/p/src/b.ts", "/p/src/gone.ts"]));
        src.insert_child(file("/p/src/b.ts", &["/p/src/b.ts"]));
        src.insert_child(file("/p/src/c.ts", &["/p/src/b.ts", "/p/src/a.ts"]));
        root.insert_child(src);
        root
    }

    fn dependents(root: &FileNode, path: &str) -> Vec<PathBuf> {
        root.find(Path::new(path))
            .unwrap()
            .dependents
            .iter()
            .cloned()
            .collect()
    }

    #[test]
    fn test_transpose() {
        let mut root = tree();
        build_dependents(&mut root);

        assert_eq!(
            dependents(&root, "/p/src/b.ts"),
            vec![
                PathBuf::from("/p/src/a.ts"),
                PathBuf::from("/p/src/b.ts"),
                PathBuf::from("/p/src/c.ts"),
            ]
        );
        assert_eq!(dependents(&root, "/p/src/a.ts"), vec![PathBuf::from("/p/src/c.ts")]);
        assert!(dependents(&root, "/p/src/c.ts").is_empty());
        // dangling edges are kept on the source only
        assert!(
            root.find(Path::new("/p/src/a.ts"))
                .unwrap()
                .dependencies
                .contains(Path::new("/p/src/gone.ts"))
        );
    }

    #[test]
    fn test_idempotent() {
        let mut once = tree();
        build_dependents(&mut once);
        let mut twice = once.clone();
        build_dependents(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_strip_path_removes_subtree_references() {
        let mut root = tree();
        build_dependents(&mut root);
        strip_path(&mut root, Path::new("/p/src/b.ts"));

        for node in root.iter() {
            assert!(!node.dependencies.contains(Path::new("/p/src/b.ts")));
            assert!(!node.dependents.contains(Path::new("/p/src/b.ts")));
        }
        assert_eq!(dependents(&root, "/p/src/a.ts"), vec![PathBuf::from("/p/src/c.ts")]);

        strip_path(&mut root, Path::new("/p/src"));
        assert!(root.iter().all(|n| n.dependents.is_empty()));
    }
}
