//! JavaScript and TypeScript module references.

use std::path::{Path, PathBuf};

use filescope_core::UnresolvedReason;
use filescope_core::path::{is_within, normalize, normalize_separators};
use regex::Regex;

use super::resolve::{ExtractContext, first_existing, parent_dir, with_suffixes};
use super::{RawReference, Resolution, capture_line};

const EXTENSIONS: &[&str] = &[
    ".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".mts", ".cts", ".d.ts",
];

/// Emitted extension and the source extension it is compiled from.
const SOURCE_SWAPS: &[(&str, &str)] = &[
    (".js", ".ts"),
    (".jsx", ".tsx"),
    (".mjs", ".mts"),
    (".cjs", ".cts"),
];

#[derive(Debug)]
pub(super) struct Patterns {
    /// `import x from '…'`, `export { x } from '…'`, `export * from '…'`.
    from_clause: Regex,
    /// `import '…'`.
    side_effect: Regex,
    /// `require('…')` and dynamic `import('…')`.
    call: Regex,
}

impl Patterns {
    pub(super) fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            from_clause: Regex::new(
                r#"\b(?:import|export)\s+(?:type\s+)?[^'";]*?\bfrom\s*['"]([^'"\n]+)['"]"#,
            )?,
            side_effect: Regex::new(r#"\bimport\s*['"]([^'"\n]+)['"]"#)?,
            call: Regex::new(r#"\b(?:require|import)\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#)?,
        })
    }

    pub(super) fn extract(
        &self,
        file: &Path,
        source: &str,
        ctx: &ExtractContext<'_>,
    ) -> Vec<RawReference> {
        [&self.from_clause, &self.side_effect, &self.call]
            .into_iter()
            .flat_map(|re| re.captures_iter(source))
            .map(|caps| {
                let specifier = &caps[1];
                let line = capture_line(source, &caps, 1);
                RawReference::new(specifier, line, resolve(file, specifier, ctx))
            })
            .collect()
    }
}

fn resolve(file: &Path, specifier: &str, ctx: &ExtractContext<'_>) -> Resolution {
    let spec = normalize_separators(specifier);
    let target = if spec.starts_with("./")
        || spec.starts_with("../")
        || spec == "."
        || spec == ".."
    {
        normalize(&spec, parent_dir(file))
    } else if let Some(rooted) = spec.strip_prefix('/') {
        normalize(rooted, ctx.project_root)
    } else {
        return Resolution::Unresolved(UnresolvedReason::External);
    };

    if !is_within(&target, ctx.root) {
        return Resolution::Unresolved(UnresolvedReason::OutsideRoot);
    }
    first_existing(candidates(&target), ctx)
}

fn candidates(target: &Path) -> Vec<PathBuf> {
    let mut out = vec![target.to_path_buf()];
    out.extend(with_suffixes(target, EXTENSIONS));

    let raw = target.to_string_lossy();
    for (emitted, source) in SOURCE_SWAPS {
        if let Some(stem) = raw.strip_suffix(emitted) {
            out.push(PathBuf::from(format!("{stem}{source}")));
        }
    }

    let index = target.join("index");
    out.extend(with_suffixes(&index, EXTENSIONS));
    out
}
