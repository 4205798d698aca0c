//! Core types and traits for filescope.
//!
//! This crate provides the fundamental data structures used throughout
//! the filescope workspace: file nodes with their dependency overlay, trees,
//! configuration, exclusion rules, and the path normalizer every other
//! component keys its lookups on.

mod config;
mod error;
mod exclude;
mod node;
pub mod path;
pub mod query;
mod tree;

pub use config::{
    DEFAULT_MAX_FILE_SIZE, ScanConfig, ScanConfigBuilder, TreeConfig, WatchConfig,
    WatchConfigBuilder,
};
pub use error::{NodeNotFound, ScanError, ScanWarning, WarningKind};
pub use exclude::{ExcludeRules, compile_pattern};
pub use node::{FileNode, Iter, UnresolvedReason, UnresolvedReference, display_name, modified_time};
pub use tree::{FileTree, TreeStats};
