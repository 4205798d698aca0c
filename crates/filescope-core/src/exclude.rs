//! Exclusion rules shared by the scanner, the mutator and the watcher.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::path::{is_hidden, relative_to};

/// Compiled exclusion patterns for one tree root.
///
/// A pattern excludes an entry when it matches either the entry's path
/// relative to the root or its file name. A pattern ending in `/**` also
/// excludes the directory it names.
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    root: PathBuf,
    set: GlobSet,
    patterns: Vec<String>,
    skip_hidden: bool,
}

impl ExcludeRules {
    /// Compile `patterns` for entries under `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        patterns: &[String],
        skip_hidden: bool,
    ) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            for glob in expand_pattern(pattern) {
                builder.add(Glob::new(&glob)?);
            }
        }
        Ok(Self {
            root: root.into(),
            set: builder.build()?,
            patterns: patterns.to_vec(),
            skip_hidden,
        })
    }

    /// Rules that exclude nothing.
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            set: GlobSet::empty(),
            patterns: Vec::new(),
            skip_hidden: false,
        }
    }

    /// The source patterns.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether `path` (absolute, normalized) is excluded.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.skip_hidden && is_hidden(path, &self.root) {
            return true;
        }
        if self.set.is_empty() {
            return false;
        }
        let Some(relative) = relative_to(path, &self.root) else {
            return false;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }
        if self.set.is_match(relative) {
            return true;
        }
        path.file_name().is_some_and(|name| self.set.is_match(name))
    }
}

/// Compile a single pattern into a matcher.
pub fn compile_pattern(pattern: &str) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for glob in expand_pattern(pattern) {
        builder.add(Glob::new(&glob)?);
    }
    builder.build()
}

fn expand_pattern(pattern: &str) -> Vec<String> {
    let trimmed = pattern.trim().trim_start_matches("./").trim_end_matches('/');
    let mut globs = vec![trimmed.to_string()];
    if let Some(dir) = trimmed.strip_suffix("/**") {
        if !dir.is_empty() {
            globs.push(dir.to_string());
        }
    }
    globs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(patterns: &[&str], skip_hidden: bool) -> ExcludeRules {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        ExcludeRules::new("/repo", &patterns, skip_hidden).unwrap()
    }

    #[test]
    fn test_name_and_relative_matches() {
        let rules = rules(&["*.test.ts", "node_modules", "build/**"], false);
        assert!(rules.is_excluded(Path::new("/repo/src/x.test.ts")));
        assert!(!rules.is_excluded(Path::new("/repo/src/x.ts")));
        assert!(rules.is_excluded(Path::new("/repo/web/node_modules")));
        assert!(rules.is_excluded(Path::new("/repo/build")));
        assert!(rules.is_excluded(Path::new("/repo/build/out.js")));
        assert!(!rules.is_excluded(Path::new("/repo")));
    }

    #[test]
    fn test_hidden_rule() {
        let rules = rules(&[], true);
        assert!(rules.is_excluded(Path::new("/repo/.git/HEAD")));
        assert!(!rules.is_excluded(Path::new("/repo/src/main.rs")));
    }

    #[test]
    fn test_trailing_slash_and_invalid() {
        let rules = rules(&["dist/"], false);
        assert!(rules.is_excluded(Path::new("/repo/dist")));
        assert!(compile_pattern("a[").is_err());
    }
}
