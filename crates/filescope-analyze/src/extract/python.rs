//! Python import statements.

use std::path::{Path, PathBuf};

use filescope_core::UnresolvedReason;
use filescope_core::path::is_within;
use regex::Regex;

use super::resolve::{ExtractContext, first_existing, parent_dir};
use super::{RawReference, Resolution, capture_line};

#[derive(Debug)]
pub(super) struct Patterns {
    /// `import a.b, c as d`
    import: Regex,
    /// `from .x import y` with an optional parenthesized name list.
    from_import: Regex,
}

impl Patterns {
    pub(super) fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            import: Regex::new(r"(?m)^[ \t]*import[ \t]+([A-Za-z_][\w.]*(?:[ \t]*,[ \t]*[A-Za-z_][\w.]*(?:[ \t]+as[ \t]+\w+)?|[ \t]+as[ \t]+\w+)*)")?,
            from_import: Regex::new(
                r"(?m)^[ \t]*from[ \t]+(\.*)([A-Za-z_][\w.]*)?[ \t]+import[ \t]+(?:\(([^)]*)\)|([^\n]+))",
            )?,
        })
    }

    pub(super) fn extract(
        &self,
        file: &Path,
        source: &str,
        ctx: &ExtractContext<'_>,
    ) -> Vec<RawReference> {
        let mut refs = Vec::new();

        for caps in self.import.captures_iter(source) {
            let line = capture_line(source, &caps, 1);
            for module in caps[1].split(',') {
                let Some(module) = module.split_whitespace().next() else {
                    continue;
                };
                refs.push(RawReference::new(
                    module,
                    line,
                    resolve_absolute(file, module, ctx),
                ));
            }
        }

        for caps in self.from_import.captures_iter(source) {
            let line = capture_line(source, &caps, 1);
            let dots = caps.get(1).map_or("", |m| m.as_str());
            let module = caps.get(2).map_or("", |m| m.as_str());

            if dots.is_empty() {
                refs.push(RawReference::new(
                    module,
                    line,
                    resolve_absolute(file, module, ctx),
                ));
                continue;
            }

            let Some(package) = package_dir(file, dots.len()) else {
                refs.push(RawReference::new(
                    format!("{dots}{module}"),
                    line,
                    Resolution::Unresolved(UnresolvedReason::OutsideRoot),
                ));
                continue;
            };

            if !module.is_empty() {
                refs.push(RawReference::new(
                    format!("{dots}{module}"),
                    line,
                    resolve_in(&package, module, ctx),
                ));
                continue;
            }

            // `from . import a, b`: each name may be a sibling module.
            let names = caps.get(3).or_else(|| caps.get(4)).map_or("", |m| m.as_str());
            for name in imported_names(names) {
                let base = package.join(name);
                let candidates = vec![
                    base.with_extension("py"),
                    base.join("__init__.py"),
                    package.join("__init__.py"),
                ];
                refs.push(RawReference::new(
                    format!("{dots}{name}"),
                    line,
                    within_root(&package, ctx).unwrap_or_else(|| first_existing(candidates, ctx)),
                ));
            }
        }

        refs
    }
}

/// Directory of the package `dots` levels up from `file` (one dot is the
/// file's own package).
fn package_dir(file: &Path, dots: usize) -> Option<PathBuf> {
    let mut dir = parent_dir(file);
    for _ in 1..dots {
        dir = dir.parent()?;
    }
    Some(dir.to_path_buf())
}

fn module_candidates(base: &Path, module: &str) -> [PathBuf; 2] {
    let path = base.join(module.replace('.', "/"));
    [path.with_extension("py"), path.join("__init__.py")]
}

fn within_root(dir: &Path, ctx: &ExtractContext<'_>) -> Option<Resolution> {
    (!is_within(dir, ctx.root)).then_some(Resolution::Unresolved(UnresolvedReason::OutsideRoot))
}

fn resolve_in(package: &Path, module: &str, ctx: &ExtractContext<'_>) -> Resolution {
    within_root(package, ctx)
        .unwrap_or_else(|| first_existing(module_candidates(package, module), ctx))
}

/// Absolute modules are looked up beside the file, then under the project
/// root; anything else is a third-party or standard library module.
fn resolve_absolute(file: &Path, module: &str, ctx: &ExtractContext<'_>) -> Resolution {
    let candidates = module_candidates(parent_dir(file), module)
        .into_iter()
        .chain(module_candidates(ctx.project_root, module));
    match first_existing(candidates, ctx) {
        Resolution::Unresolved(UnresolvedReason::Missing) => {
            Resolution::Unresolved(UnresolvedReason::External)
        }
        other => other,
    }
}

fn imported_names(list: &str) -> impl Iterator<Item = &str> {
    list.split(',')
        .filter_map(|item| item.split_whitespace().next())
        .filter(|name| *name != "*" && !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("pkg/sub")).unwrap();
        for file in [
            "pkg/__init__.py",
            "pkg/models.py",
            "pkg/sub/__init__.py",
            "pkg/sub/views.py",
            "pkg/sub/helpers.py",
            "settings.py",
        ] {
            fs::write(root.join(file), "").unwrap();
        }
        (temp, root)
    }

    fn resolved_names(root: &Path, refs: &[RawReference]) -> Vec<(String, Option<PathBuf>)> {
        refs.iter()
            .map(|r| {
                let target = match &r.resolution {
                    Resolution::Resolved(p) => Some(p.strip_prefix(root).unwrap().to_path_buf()),
                    Resolution::Unresolved(_) => None,
                };
                (r.specifier.clone(), target)
            })
            .collect()
    }

    #[test]
    fn test_relative_imports() {
        let (_temp, root) = fixture();
        let patterns = Patterns::compile().unwrap();
        let ctx = ExtractContext::new(&root);
        let source = "from . import helpers\nfrom .. import models\nfrom ..models import User\nfrom .missing import x\n";
        let refs = patterns.extract(&root.join("pkg/sub/views.py"), source, &ctx);

        assert_eq!(
            resolved_names(&root, &refs),
            vec![
                (".helpers".to_string(), Some(PathBuf::from("pkg/sub/helpers.py"))),
                ("..models".to_string(), Some(PathBuf::from("pkg/models.py"))),
                ("..models".to_string(), Some(PathBuf::from("pkg/models.py"))),
                (".missing".to_string(), None),
            ]
        );
        assert_eq!(refs[3].resolution, Resolution::Unresolved(UnresolvedReason::Missing));
    }

    #[test]
    fn test_absolute_imports() {
        let (_temp, root) = fixture();
        let patterns = Patterns::compile().unwrap();
        let ctx = ExtractContext::new(&root);
        let source = "import os, settings\nimport pkg.sub as s\nfrom pkg.models import User\n";
        let refs = patterns.extract(&root.join("main.py"), source, &ctx);

        assert_eq!(
            resolved_names(&root, &refs),
            vec![
                ("os".to_string(), None),
                ("settings".to_string(), Some(PathBuf::from("settings.py"))),
                ("pkg.sub".to_string(), Some(PathBuf::from("pkg/sub/__init__.py"))),
                ("pkg.models".to_string(), Some(PathBuf::from("pkg/models.py"))),
            ]
        );
        assert_eq!(refs[0].resolution, Resolution::Unresolved(UnresolvedReason::External));
    }

    #[test]
    fn test_parenthesized_names_span_lines() {
        let (_temp, root) = fixture();
        let patterns = Patterns::compile().unwrap();
        let ctx = ExtractContext::new(&root);
        let source = "from . import (\n    helpers,\n    views as v,\n)\n";
        let refs = patterns.extract(&root.join("pkg/sub/__init__.py"), source, &ctx);
        let specs: Vec<_> = refs.iter().map(|r| r.specifier.as_str()).collect();
        assert_eq!(specs, vec![".helpers", ".views"]);
        assert!(refs.iter().all(|r| r.line == 1));
    }
}
