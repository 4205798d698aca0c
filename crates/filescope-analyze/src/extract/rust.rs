//! Rust module declarations and `use` paths.

use std::path::{Path, PathBuf};

use filescope_core::UnresolvedReason;
use regex::Regex;

use super::resolve::{ExtractContext, first_existing, parent_dir};
use super::{RawReference, Resolution, capture_line};

#[derive(Debug)]
pub(super) struct Patterns {
    /// `mod x;` (inline `mod x { … }` blocks are not files).
    mod_decl: Regex,
    /// `use a::b::c` up to the first brace, glob or alias.
    use_path: Regex,
}

impl Patterns {
    pub(super) fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            mod_decl: Regex::new(
                r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?mod[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*;",
            )?,
            use_path: Regex::new(
                r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?use[ \t]+(?:::)?([A-Za-z_][A-Za-z0-9_]*(?:::[A-Za-z_][A-Za-z0-9_]*)*)",
            )?,
        })
    }

    pub(super) fn extract(
        &self,
        file: &Path,
        source: &str,
        ctx: &ExtractContext<'_>,
    ) -> Vec<RawReference> {
        let module_dir = module_dir(file);
        let mut refs = Vec::new();

        for caps in self.mod_decl.captures_iter(source) {
            let name = &caps[1];
            let base = module_dir.join(name);
            let candidates = [base.with_extension("rs"), base.join("mod.rs")];
            refs.push(RawReference::new(
                name,
                capture_line(source, &caps, 1),
                first_existing(candidates, ctx),
            ));
        }

        for caps in self.use_path.captures_iter(source) {
            let path = &caps[1];
            refs.push(RawReference::new(
                path,
                capture_line(source, &caps, 1),
                resolve_use(file, &module_dir, path, ctx),
            ));
        }

        refs
    }
}

/// Directory holding the files of `file`'s child modules.
fn module_dir(file: &Path) -> PathBuf {
    let dir = parent_dir(file);
    match file.file_name().and_then(|n| n.to_str()) {
        Some("mod.rs" | "lib.rs" | "main.rs") | None => dir.to_path_buf(),
        Some(_) => match file.file_stem() {
            Some(stem) => dir.join(stem),
            None => dir.to_path_buf(),
        },
    }
}

/// Nearest `src` ancestor that is a crate root.
fn crate_src_dir(file: &Path) -> Option<&Path> {
    file.ancestors().skip(1).find(|dir| {
        dir.file_name().is_some_and(|n| n == "src")
            && (dir.join("lib.rs").is_file() || dir.join("main.rs").is_file())
    })
}

fn resolve_use(
    file: &Path,
    module_dir: &Path,
    path: &str,
    ctx: &ExtractContext<'_>,
) -> Resolution {
    let mut segments: Vec<&str> = path.split("::").collect();
    let (base, fallback) = match segments.first().copied() {
        Some("crate") => {
            let Some(src) = crate_src_dir(file) else {
                return Resolution::Unresolved(UnresolvedReason::Missing);
            };
            segments.remove(0);
            (src.to_path_buf(), crate_root_files(src))
        }
        Some("self") => {
            segments.remove(0);
            (module_dir.to_path_buf(), vec![file.to_path_buf()])
        }
        Some("super") => {
            let mut dir = module_dir.to_path_buf();
            while segments.first() == Some(&"super") {
                segments.remove(0);
                if !dir.pop() {
                    return Resolution::Unresolved(UnresolvedReason::OutsideRoot);
                }
            }
            let fallback = module_files(&dir);
            (dir, fallback)
        }
        _ => return Resolution::Unresolved(UnresolvedReason::External),
    };

    // Longest prefix that names a module file wins; trailing segments are
    // items inside it.
    let mut candidates = Vec::new();
    for len in (1..=segments.len()).rev() {
        let module = segments[..len]
            .iter()
            .fold(base.clone(), |acc, segment| acc.join(segment));
        candidates.push(module.with_extension("rs"));
        candidates.push(module.join("mod.rs"));
    }
    candidates.extend(fallback);
    first_existing(candidates, ctx)
}

fn crate_root_files(src: &Path) -> Vec<PathBuf> {
    vec![src.join("lib.rs"), src.join("main.rs")]
}

/// Files that may define the module whose children live in `dir`.
fn module_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = vec![dir.with_extension("rs"), dir.join("mod.rs")];
    files.extend(crate_root_files(dir));
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("src/net/proto")).unwrap();
        for file in [
            "src/lib.rs",
            "src/config.rs",
            "src/net/mod.rs",
            "src/net/client.rs",
            "src/net/proto/frame.rs",
        ] {
            fs::write(root.join(file), "").unwrap();
        }
        (temp, root)
    }

    fn targets(root: &Path, refs: &[RawReference]) -> Vec<Option<PathBuf>> {
        refs.iter()
            .map(|r| match &r.resolution {
                Resolution::Resolved(p) => Some(p.strip_prefix(root).unwrap().to_path_buf()),
                Resolution::Unresolved(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_mod_declarations() {
        let (_temp, root) = fixture();
        let patterns = Patterns::compile().unwrap();
        let ctx = ExtractContext::new(&root);
        let source = "pub mod config;\nmod net;\nmod gone;\nmod inline { }\n";
        let refs = patterns.extract(&root.join("src/lib.rs"), source, &ctx);
        assert_eq!(
            targets(&root, &refs),
            vec![
                Some(PathBuf::from("src/config.rs")),
                Some(PathBuf::from("src/net/mod.rs")),
                None
            ]
        );
        assert_eq!(refs[2].resolution, Resolution::Unresolved(UnresolvedReason::Missing));
    }

    #[test]
    fn test_nested_mod_uses_stem_dir() {
        let (_temp, root) = fixture();
        fs::write(root.join("src/net/proto.rs"), "").unwrap();
        let patterns = Patterns::compile().unwrap();
        let ctx = ExtractContext::new(&root);
        let refs = patterns.extract(&root.join("src/net/proto.rs"), "mod frame;\n", &ctx);
        assert_eq!(
            targets(&root, &refs),
            vec![Some(PathBuf::from("src/net/proto/frame.rs"))]
        );
    }

    #[test]
    fn test_use_paths() {
        let (_temp, root) = fixture();
        let patterns = Patterns::compile().unwrap();
        let ctx = ExtractContext::new(&root);
        let source = "use crate::config::Settings;\n\
                      use crate::net::{client, proto};\n\
                      use super::config;\n\
                      use self::proto::frame::Frame;\n\
                      use std::collections::HashMap;\n\
                      pub use crate::Error;\n";
        let refs = patterns.extract(&root.join("src/net/mod.rs"), source, &ctx);
        assert_eq!(
            targets(&root, &refs),
            vec![
                Some(PathBuf::from("src/config.rs")),
                Some(PathBuf::from("src/net/mod.rs")),
                Some(PathBuf::from("src/config.rs")),
                Some(PathBuf::from("src/net/proto/frame.rs")),
                None,
                Some(PathBuf::from("src/lib.rs")),
            ]
        );
        assert_eq!(refs[4].resolution, Resolution::Unresolved(UnresolvedReason::External));
    }

    #[test]
    fn test_super_falls_back_to_parent_module() {
        let (_temp, root) = fixture();
        let patterns = Patterns::compile().unwrap();
        let ctx = ExtractContext::new(&root);
        let refs = patterns.extract(
            &root.join("src/net/client.rs"),
            "use super::Connection;\nuse super::super::config;\n",
            &ctx,
        );
        assert_eq!(
            targets(&root, &refs),
            vec![
                Some(PathBuf::from("src/net/mod.rs")),
                Some(PathBuf::from("src/config.rs")),
            ]
        );
    }
}
