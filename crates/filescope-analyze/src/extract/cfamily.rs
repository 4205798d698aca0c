//! `#include` and `#import` directives.

use std::path::Path;

use filescope_core::UnresolvedReason;
use filescope_core::path::{normalize, normalize_separators};
use regex::Regex;

use super::resolve::{ExtractContext, first_existing, parent_dir};
use super::{RawReference, Resolution, capture_line};

#[derive(Debug)]
pub(super) struct Patterns {
    include: Regex,
}

impl Patterns {
    pub(super) fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            include: Regex::new(
                r#"(?m)^[ \t]*#[ \t]*(?:include|import)[ \t]*(?:"([^"\n]+)"|<([^>\n]+)>)"#,
            )?,
        })
    }

    pub(super) fn extract(
        &self,
        file: &Path,
        source: &str,
        ctx: &ExtractContext<'_>,
    ) -> Vec<RawReference> {
        self.include
            .captures_iter(source)
            .map(|caps| {
                if let Some(quoted) = caps.get(1) {
                    let spec = normalize_separators(quoted.as_str());
                    let candidates = [
                        normalize(&spec, parent_dir(file)),
                        normalize(&spec, ctx.project_root),
                    ];
                    RawReference::new(
                        quoted.as_str(),
                        capture_line(source, &caps, 1),
                        first_existing(candidates, ctx),
                    )
                } else {
                    RawReference::new(
                        caps.get(2).map_or("", |m| m.as_str()),
                        capture_line(source, &caps, 2),
                        Resolution::Unresolved(UnresolvedReason::External),
                    )
                }
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
    fn test_includes() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("include")).unwrap();
        fs::write(root.join("src/util.h"), "").unwrap();
        fs::write(root.join("include/api.h"), "").unwrap();

        let patterns = Patterns::compile().unwrap();
        let ctx = ExtractContext::new(&root);
        let source = "#include \"util.h\"\n#include <stdio.h>\n  #  include \"include/api.h\"\n#include \"nope.h\"\n";
        let refs = patterns.extract(&root.join("src/main.c"), source, &ctx);

        assert_eq!(refs.len(), 4);
        assert_eq!(refs[0].resolution, Resolution::Resolved(root.join("src/util.h")));
        assert_eq!(refs[1].specifier, "stdio.h");
        assert_eq!(refs[1].resolution, Resolution::Unresolved(UnresolvedReason::External));
        assert_eq!(refs[2].resolution, Resolution::Resolved(root.join("include/api.h")));
        assert_eq!(refs[2].line, 3);
        assert_eq!(refs[3].resolution, Resolution::Unresolved(UnresolvedReason::Missing));
    }
}
