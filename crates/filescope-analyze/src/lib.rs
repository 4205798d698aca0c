//! Dependency analysis for filescope.
//!
//! This crate turns scanned file trees into a dependency graph:
//!
//! - **Extraction** - Find import-like references in source files and resolve
//!   them to files under the tree root
//! - **Mapping** - Derive every file's dependents from the dependency edges
//! - **Importance** - Score files by how central they are to the graph
//!
//! # Extraction
//!
//! Matchers are compiled once and shared by all worker threads:
//!
//! ```rust,ignore
//! use filescope_analyze::{DependencyExtractor, ExtractContext};
//!
//! let extractor = DependencyExtractor::new()?;
//! let ctx = ExtractContext::new(root);
//! let extraction = extractor.extract_file(&root.join("src/index.ts"), &ctx)?;
//!
//! for dep in &extraction.dependencies {
//!     println!("-> {}", dep.display());
//! }
//! ```
//!
//! # Scoring
//!
//! Mapping and scoring always run over the whole tree:
//!
//! ```rust,ignore
//! use filescope_analyze::{recalculate, ranked_files};
//!
//! recalculate(&mut tree.root);
//! for file in ranked_files(&tree.root, Some(10), 0.0) {
//!     println!("{:>5.2} {}", file.importance, file.path.display());
//! }
//! ```

mod extract;
mod importance;
mod mapper;

pub use extract::{
    DependencyExtractor, ExtractContext, ExtractError, Extraction, FileType, RawReference,
    Resolution,
};
pub use importance::{
    Degree, MAX_IMPORTANCE, directory_importance, importance_for, ranked_files, score,
};
pub use mapper::{build_dependents, strip_path};

// Re-export core types
pub use filescope_core::{FileNode, FileTree};

/// Rebuild dependents and rescore every file.
pub fn recalculate(root: &mut FileNode) {
    build_dependents(root);
    score(root);
}
