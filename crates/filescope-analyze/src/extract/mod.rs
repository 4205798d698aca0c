//! Lexical dependency extraction.
//!
//! Each supported language has a small set of regular expressions compiled
//! once in [`DependencyExtractor::new`]. Source text is stripped of comments
//! first, then every import-like construct is turned into a [`RawReference`]
//! that either resolves to a file under the tree root or carries the reason it
//! did not. Nothing is dropped: unresolved references are kept for
//! diagnostics.

mod cfamily;
mod css;
mod lexer;
mod python;
mod resolve;
mod ruby;
mod rust;
mod script;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use filescope_core::{FileNode, ScanWarning, UnresolvedReason, UnresolvedReference};
use itertools::Itertools;
use strum::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;
use tracing::trace;

pub use resolve::ExtractContext;

use lexer::{CommentStyle, line_number_for, strip_comments};

/// Language family of a source file, detected from its extension.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum FileType {
    /// JavaScript, TypeScript and single-file components.
    Script,
    Python,
    Rust,
    /// C, C++ and Objective-C sources and headers.
    CFamily,
    Ruby,
    /// CSS and its preprocessors.
    Css,
    /// Anything else; never scanned for references.
    #[default]
    Other,
}

impl FileType {
    /// Detect the file type from the extension of `path`.
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Self::Other;
        };
        match ext.to_ascii_lowercase().as_str() {
            "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts" | "vue" | "svelte" => {
                Self::Script
            }
            "py" | "pyi" => Self::Python,
            "rs" => Self::Rust,
            "c" | "h" | "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" | "m" | "mm" => Self::CFamily,
            "rb" => Self::Ruby,
            "css" | "scss" | "sass" | "less" => Self::Css,
            _ => Self::Other,
        }
    }

    /// Whether files of this type are scanned for references.
    pub fn is_supported(self) -> bool {
        self != Self::Other
    }

    fn comment_style(self) -> CommentStyle {
        match self {
            Self::Script | Self::CFamily => lexer::C_LIKE,
            Self::Rust => lexer::RUST,
            Self::Python | Self::Ruby => lexer::HASH,
            Self::Css | Self::Other => lexer::BLOCK_ONLY,
        }
    }
}

/// Where a reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A normalized path of an existing file under the tree root.
    Resolved(PathBuf),
    Unresolved(UnresolvedReason),
}

/// One import-like construct found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReference {
    /// The specifier as written.
    pub specifier: String,
    /// 1-based line of the specifier.
    pub line: usize,
    pub resolution: Resolution,
}

impl RawReference {
    pub(crate) fn new(specifier: impl Into<String>, line: usize, resolution: Resolution) -> Self {
        Self {
            specifier: specifier.into(),
            line,
            resolution,
        }
    }
}

/// Extraction result for one file, ready to attach to its node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub dependencies: BTreeSet<PathBuf>,
    pub unresolved: Vec<UnresolvedReference>,
}

impl Extraction {
    /// Split references into resolved edges and diagnostics.
    pub fn from_references(references: Vec<RawReference>) -> Self {
        let mut extraction = Self::default();
        for reference in references {
            match reference.resolution {
                Resolution::Resolved(path) => {
                    extraction.dependencies.insert(path);
                }
                Resolution::Unresolved(reason) => {
                    extraction.unresolved.push(UnresolvedReference {
                        specifier: reference.specifier,
                        line: reference.line,
                        reason,
                    });
                }
            }
        }
        extraction
    }

    /// Replace the node's outgoing edges and diagnostics with this result.
    ///
    /// Returns whether the dependency set changed.
    pub fn apply_to(self, node: &mut FileNode) -> bool {
        let changed = node.dependencies != self.dependencies;
        node.dependencies = self.dependencies;
        node.unresolved = self.unresolved;
        changed
    }
}

/// A file whose references could not be extracted.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not valid UTF-8: {path}")]
    InvalidUtf8 { path: PathBuf },

    #[error("File too large ({size} bytes, limit {limit}): {path}")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },
}

impl ExtractError {
    /// Path of the file that failed.
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::InvalidUtf8 { path } | Self::TooLarge { path, .. } => {
                path
            }
        }
    }

    /// Convert into a non-fatal scan warning.
    pub fn into_warning(self) -> ScanWarning {
        let message = self.to_string();
        ScanWarning::parse_failure(self.path().to_path_buf(), message)
    }
}

/// Extracts dependency references from source files.
#[derive(Debug)]
pub struct DependencyExtractor {
    script: script::Patterns,
    python: python::Patterns,
    rust: rust::Patterns,
    cfamily: cfamily::Patterns,
    ruby: ruby::Patterns,
    css: css::Patterns,
    max_file_size: u64,
}

impl DependencyExtractor {
    /// Compile the matchers for every supported language.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            script: script::Patterns::compile()?,
            python: python::Patterns::compile()?,
            rust: rust::Patterns::compile()?,
            cfamily: cfamily::Patterns::compile()?,
            ruby: ruby::Patterns::compile()?,
            css: css::Patterns::compile()?,
            max_file_size: filescope_core::DEFAULT_MAX_FILE_SIZE,
        })
    }

    /// Set the size above which files are not read.
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Extract references from `content`, the text of the file at `path`.
    ///
    /// `path` must be normalized. Duplicate references on the same line are
    /// reported once.
    pub fn extract(
        &self,
        path: &Path,
        content: &str,
        file_type: FileType,
        ctx: &ExtractContext<'_>,
    ) -> Vec<RawReference> {
        if !file_type.is_supported() {
            return Vec::new();
        }
        let source = strip_comments(content, file_type.comment_style());
        let references = match file_type {
            FileType::Script => self.script.extract(path, &source, ctx),
            FileType::Python => self.python.extract(path, &source, ctx),
            FileType::Rust => self.rust.extract(path, &source, ctx),
            FileType::CFamily => self.cfamily.extract(path, &source, ctx),
            FileType::Ruby => self.ruby.extract(path, &source, ctx),
            FileType::Css => self.css.extract(path, &source, ctx),
            FileType::Other => Vec::new(),
        };
        let references: Vec<_> = references
            .into_iter()
            .sorted_by_key(|r| r.line)
            .unique_by(|r| (r.specifier.clone(), r.line))
            .collect();
        trace!(path = %path.display(), count = references.len(), "extracted references");
        references
    }

    /// Read the file at `path` and extract its references.
    ///
    /// Unsupported file types yield an empty extraction without touching the
    /// file.
    pub fn extract_file(
        &self,
        path: &Path,
        ctx: &ExtractContext<'_>,
    ) -> Result<Extraction, ExtractError> {
        let file_type = FileType::from_path(path);
        if !file_type.is_supported() {
            return Ok(Extraction::default());
        }

        let io_err = |source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        };
        let size = fs::metadata(path).map_err(io_err)?.len();
        if size > self.max_file_size {
            return Err(ExtractError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.max_file_size,
            });
        }
        let bytes = fs::read(path).map_err(io_err)?;
        let content = String::from_utf8(bytes).map_err(|_| ExtractError::InvalidUtf8 {
            path: path.to_path_buf(),
        })?;

        Ok(Extraction::from_references(
            self.extract(path, &content, file_type, ctx),
        ))
    }
}

/// Byte offset of capture group `idx` (or the whole match) mapped to a line.
pub(crate) fn capture_line(source: &str, caps: &regex::Captures<'_>, idx: usize) -> usize {
    let start = caps
        .get(idx)
        .or_else(|| caps.get(0))
        .map(|m| m.start())
        .unwrap_or(0);
    line_number_for(source, start)
}
