//! Path normalization and comparison.
//!
//! Every path stored in a tree, in a dependency set, or handed to a query goes
//! through [`normalize`] first, so that lookups compare like with like. The
//! functions here are purely lexical and never touch the filesystem.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Whether path comparison ignores ASCII case on this platform.
pub const CASE_INSENSITIVE: bool = cfg!(any(windows, target_os = "macos"));

/// Normalize `path` into an absolute, lexically clean path.
///
/// Relative paths are joined onto `base`. `.` components are dropped and `..`
/// pops the previous component (never above the filesystem root).
pub fn normalize(path: impl AsRef<Path>, base: &Path) -> PathBuf {
    let path = path.as_ref();
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Rewrite `\` separators in an import specifier to `/`.
pub fn normalize_separators(specifier: &str) -> String {
    if specifier.contains('\\') {
        specifier.replace('\\', "/")
    } else {
        specifier.to_string()
    }
}

fn component_eq(a: &OsStr, b: &OsStr) -> bool {
    if CASE_INSENSITIVE {
        a.to_string_lossy()
            .eq_ignore_ascii_case(&b.to_string_lossy())
    } else {
        a == b
    }
}

/// Compare two normalized paths under the platform case policy.
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    let mut left = a.components();
    let mut right = b.components();
    loop {
        match (left.next(), right.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) if component_eq(x.as_os_str(), y.as_os_str()) => {}
            _ => return false,
        }
    }
}

/// Whether `path` equals `root` or lies below it.
pub fn is_within(path: &Path, root: &Path) -> bool {
    let mut inner = path.components();
    for root_part in root.components() {
        match inner.next() {
            Some(part) if component_eq(part.as_os_str(), root_part.as_os_str()) => {}
            _ => return false,
        }
    }
    true
}

/// Path of `path` relative to `root`, if it lies within it.
pub fn relative_to<'a>(path: &'a Path, root: &Path) -> Option<&'a Path> {
    if !is_within(path, root) {
        return None;
    }
    let skip = root.components().count();
    let mut components = path.components();
    for _ in 0..skip {
        components.next();
    }
    Some(components.as_path())
}

/// Whether any component of `path` below `root` starts with a dot.
pub fn is_hidden(path: &Path, root: &Path) -> bool {
    relative_to(path, root)
        .unwrap_or(path)
        .components()
        .any(|c| matches!(c, Component::Normal(part) if part.to_string_lossy().starts_with('.')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative() {
        let base = Path::new("/repo/src");
        assert_eq!(normalize("./a/../b.ts", base), PathBuf::from("/repo/src/b.ts"));
        assert_eq!(normalize("../lib/c.py", base), PathBuf::from("/repo/lib/c.py"));
    }

    #[test]
    fn test_normalize_absolute_and_root_clamp() {
        let base = Path::new("/repo");
        assert_eq!(normalize("/x/./y/", base), PathBuf::from("/x/y"));
        assert_eq!(normalize("/../../etc", base), PathBuf::from("/etc"));
    }

    #[test]
    fn test_separators() {
        assert_eq!(normalize_separators("..\\lib\\x.h"), "../lib/x.h");
        assert_eq!(normalize_separators("./a.ts"), "./a.ts");
    }

    #[test]
    fn test_within_and_relative() {
        let root = Path::new("/repo");
        assert!(is_within(Path::new("/repo/src/a.ts"), root));
        assert!(is_within(root, root));
        assert!(!is_within(Path::new("/repository/a.ts"), root));
        assert_eq!(
            relative_to(Path::new("/repo/src/a.ts"), root),
            Some(Path::new("src/a.ts"))
        );
        assert_eq!(relative_to(Path::new("/other"), root), None);
    }

    #[test]
    fn test_hidden() {
        let root = Path::new("/home/.user/repo");
        assert!(!is_hidden(Path::new("/home/.user/repo/src/a.ts"), root));
        assert!(is_hidden(Path::new("/home/.user/repo/.git/config"), root));
        assert!(is_hidden(Path::new("/home/.user/repo/src/.env"), root));
    }

    #[test]
    fn test_paths_equal() {
        assert!(paths_equal(Path::new("/a/b"), Path::new("/a/b")));
        assert!(!paths_equal(Path::new("/a/b"), Path::new("/a/b/c")));
        assert_eq!(
            paths_equal(Path::new("/a/B.ts"), Path::new("/a/b.ts")),
            CASE_INSENSITIVE
        );
    }
}
