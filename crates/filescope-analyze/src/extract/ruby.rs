//! `require`, `require_relative` and `load` calls.

use std::path::Path;

use filescope_core::UnresolvedReason;
use filescope_core::path::{normalize, normalize_separators};
use regex::Regex;

use super::resolve::{ExtractContext, first_existing, parent_dir, relative, with_suffixes};
use super::{RawReference, Resolution, capture_line};

const SUFFIXES: &[&str] = &["", ".rb"];

#[derive(Debug)]
pub(super) struct Patterns {
    call: Regex,
}

impl Patterns {
    pub(super) fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            call: Regex::new(
                r#"(?m)^[ \t]*(require_relative|require|load)[ \t]*\(?[ \t]*['"]([^'"\n]+)['"]"#,
            )?,
        })
    }

    pub(super) fn extract(
        &self,
        file: &Path,
        source: &str,
        ctx: &ExtractContext<'_>,
    ) -> Vec<RawReference> {
        self.call
            .captures_iter(source)
            .map(|caps| {
                let specifier = &caps[2];
                let spec = normalize_separators(specifier);
                let dir = parent_dir(file);
                let resolution = match &caps[1] {
                    "require_relative" => relative(dir, &spec, SUFFIXES, ctx),
                    "require" if spec.starts_with("./") || spec.starts_with("../") => {
                        relative(dir, &spec, SUFFIXES, ctx)
                    }
                    "require" => {
                        let lib = normalize(&spec, &ctx.project_root.join("lib"));
                        match first_existing(with_suffixes(&lib, SUFFIXES), ctx) {
                            Resolution::Unresolved(UnresolvedReason::Missing) => {
                                Resolution::Unresolved(UnresolvedReason::External)
                            }
                            other => other,
                        }
                    }
                    _ => first_existing(
                        [normalize(&spec, dir), normalize(&spec, ctx.project_root)],
                        ctx,
                    ),
                };
                RawReference::new(specifier, capture_line(source, &caps, 2), resolution)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_require_forms() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("lib/app")).unwrap();
        fs::create_dir_all(root.join("tasks")).unwrap();
        fs::write(root.join("lib/app/models.rb"), "").unwrap();
        fs::write(root.join("lib/app.rb"), "").unwrap();
        fs::write(root.join("tasks/seed.rake"), "").unwrap();

        let patterns = Patterns::compile().unwrap();
        let ctx = ExtractContext::new(&root);
        let source = "require 'json'\nrequire 'app'\nrequire_relative 'app/models'\nload 'tasks/seed.rake'\nrequire_relative('missing')\n";
        let refs = patterns.extract(&root.join("lib/app.rb"), source, &ctx);

        let resolutions: Vec<_> = refs.into_iter().map(|r| r.resolution).collect();
        assert_eq!(
            resolutions,
            vec![
                Resolution::Unresolved(UnresolvedReason::External),
                Resolution::Resolved(root.join("lib/app.rb")),
                Resolution::Resolved(root.join("lib/app/models.rb")),
                Resolution::Resolved(root.join("tasks/seed.rake")),
                Resolution::Unresolved(UnresolvedReason::Missing),
            ]
        );
    }
}
