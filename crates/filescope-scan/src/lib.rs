//! File system scanning engine for filescope.
//!
//! This crate walks a project directory and builds the file tree with every
//! file's dependencies already extracted.
//!
//! # Overview
//!
//! - **Parallel traversal** via jwalk/rayon
//! - **Parallel extraction** of each file's references on a rayon pool
//! - **Progress updates** via broadcast channels
//! - **Symlink loop detection** through a concurrent visited-directory set
//! - **Exclusion rules** applied before a directory is descended into
//!
//! # Example
//!
//! ```rust,no_run
//! use filescope_scan::{ScanConfig, TreeScanner};
//!
//! let config = ScanConfig::new("/path/to/project");
//! let outcome = TreeScanner::new().scan(&config).unwrap();
//!
//! println!("Files: {}", outcome.stats.total_files);
//! println!("Edges: {}", outcome.stats.total_edges);
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use filescope_scan::TreeScanner;
//!
//! let scanner = TreeScanner::new();
//! let mut progress_rx = scanner.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(progress) = progress_rx.recv().await {
//!         println!("Scanned {} files", progress.files_scanned);
//!     }
//! });
//! ```

mod progress;
mod scanner;
mod visited;

pub use progress::{ScanPhase, ScanProgress};
pub use scanner::{ScanOutcome, TreeScanner, scan};
pub use visited::VisitedDirs;

// Re-export core types for convenience
pub use filescope_core::{FileNode, ScanConfig, ScanError, ScanWarning, TreeStats, WarningKind};
