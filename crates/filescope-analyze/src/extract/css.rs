//! `@import`, `@use` and `@forward` rules in CSS, Sass and Less.

use std::path::{Path, PathBuf};

use filescope_core::UnresolvedReason;
use filescope_core::path::{is_within, normalize, normalize_separators};
use regex::Regex;

use super::resolve::{ExtractContext, first_existing, parent_dir, with_suffixes};
use super::{RawReference, Resolution, capture_line};

const EXTERNAL_PREFIXES: &[&str] = &["http://", "https://", "//", "sass:", "~"];

#[derive(Debug)]
pub(super) struct Patterns {
    /// Quoted specifier, optionally wrapped in `url(…)`.
    quoted: Regex,
    /// `@import url(path)` without quotes.
    bare_url: Regex,
}

impl Patterns {
    pub(super) fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            quoted: Regex::new(
                r#"@(?:import|use|forward)\s+(?:url\(\s*)?['"]([^'"\n]+)['"]"#,
            )?,
            bare_url: Regex::new(r#"@import\s+url\(\s*([^'"\s)]+)\s*\)"#)?,
        })
    }

    pub(super) fn extract(
        &self,
        file: &Path,
        source: &str,
        ctx: &ExtractContext<'_>,
    ) -> Vec<RawReference> {
        let extensions = family_extensions(file);
        [&self.quoted, &self.bare_url]
            .into_iter()
            .flat_map(|re| re.captures_iter(source))
            .map(|caps| {
                let specifier = &caps[1];
                RawReference::new(
                    specifier,
                    capture_line(source, &caps, 1),
                    resolve(file, specifier, extensions, ctx),
                )
            })
            .collect()
    }
}

/// Extensions a stylesheet of this kind may import without naming them.
fn family_extensions(file: &Path) -> &'static [&'static str] {
    match file.extension().and_then(|e| e.to_str()) {
        Some("scss") => &[".scss", ".sass", ".css"],
        Some("sass") => &[".sass", ".scss", ".css"],
        Some("less") => &[".less", ".css"],
        _ => &[".css"],
    }
}

fn resolve(
    file: &Path,
    specifier: &str,
    extensions: &[&str],
    ctx: &ExtractContext<'_>,
) -> Resolution {
    if EXTERNAL_PREFIXES.iter().any(|p| specifier.starts_with(p)) {
        return Resolution::Unresolved(UnresolvedReason::External);
    }
    let spec = normalize_separators(specifier);
    let target = match spec.strip_prefix('/') {
        Some(rooted) => normalize(rooted, ctx.project_root),
        None => normalize(&spec, parent_dir(file)),
    };
    if !is_within(&target, ctx.root) {
        return Resolution::Unresolved(UnresolvedReason::OutsideRoot);
    }
    first_existing(candidates(&target, extensions), ctx)
}

fn candidates(target: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut out = vec![target.to_path_buf()];
    out.extend(with_suffixes(target, extensions));

    // Sass partials: `@use 'vars'` loads `_vars.scss`.
    if let (Some(dir), Some(name)) = (target.parent(), target.file_name()) {
        let partial = dir.join(format!("_{}", name.to_string_lossy()));
        out.push(partial.clone());
        out.extend(with_suffixes(&partial, extensions));
    }

    out.extend(with_suffixes(&target.join("_index"), extensions));
    out.extend(with_suffixes(&target.join("index"), extensions));
    out
}
