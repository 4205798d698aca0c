//! Scan, watch and tree configuration types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default cap on the size of a file whose dependencies are extracted.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Configuration for scanning operations.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root path to scan.
    pub root: PathBuf,

    /// Root used for root-relative imports (defaults to `root`).
    #[builder(default)]
    #[serde(default)]
    pub project_root: Option<PathBuf>,

    /// Follow symbolic links.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Maximum depth to traverse (None = unlimited).
    #[builder(default)]
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Glob patterns to exclude.
    #[builder(default)]
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Number of threads for scanning (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Files larger than this are kept in the tree without extraction.
    #[builder(default = "DEFAULT_MAX_FILE_SIZE")]
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            project_root: None,
            follow_symlinks: false,
            max_depth: None,
            exclude_patterns: Vec::new(),
            threads: 0,
            include_hidden: true,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// File watching settings, persisted as `fileWatching`.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    /// Whether the watcher should run for this tree.
    #[builder(default = "false")]
    #[serde(default)]
    pub enabled: bool,

    /// Quiet period before a burst of events on one path fires.
    #[builder(default = "300")]
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Skip any path with a dot-prefixed component.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub ignore_dot_files: bool,

    /// Rebuild the whole tree when the event stream reports lost events.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub auto_rebuild_tree: bool,

    /// Upper bound on the number of directories registered with the OS.
    #[builder(default = "1000")]
    #[serde(default = "default_max_watched_directories")]
    pub max_watched_directories: usize,

    /// React to created files.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub watch_for_new_files: bool,

    /// React to deleted files.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub watch_for_deleted: bool,

    /// React to modified files.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub watch_for_changed: bool,
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_max_watched_directories() -> usize {
    1000
}

impl WatchConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.debounce_ms == Some(0) {
            return Err("debounce_ms must be greater than zero".to_string());
        }
        if self.max_watched_directories == Some(0) {
            return Err("max_watched_directories must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl WatchConfig {
    /// Create a new watch config builder.
    pub fn builder() -> WatchConfigBuilder {
        WatchConfigBuilder::default()
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: default_debounce_ms(),
            ignore_dot_files: true,
            auto_rebuild_tree: true,
            max_watched_directories: default_max_watched_directories(),
            watch_for_new_files: true,
            watch_for_deleted: true,
            watch_for_changed: true,
        }
    }
}

/// Configuration persisted alongside a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeConfig {
    /// Name of the persisted document inside the store directory.
    pub filename: String,
    /// Directory the tree covers; equals the root node's path.
    pub base_directory: PathBuf,
    /// Project root used for root-relative imports.
    pub project_root: PathBuf,
    /// When the tree was last written.
    pub last_updated: DateTime<Utc>,
    /// Standing exclusion list applied to scans and mutations.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// File watching settings.
    #[serde(default)]
    pub file_watching: WatchConfig,
    /// Whether scans and additions keep dot-prefixed entries.
    #[serde(default = "default_true")]
    pub include_hidden: bool,
    /// Deepest directory level a scan descends to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
}

impl TreeConfig {
    /// Create a config for a tree rooted at `base_directory`.
    pub fn new(filename: impl Into<String>, base_directory: impl Into<PathBuf>) -> Self {
        let base_directory = base_directory.into();
        Self {
            filename: filename.into(),
            project_root: base_directory.clone(),
            base_directory,
            last_updated: Utc::now(),
            exclude_patterns: Vec::new(),
            file_watching: WatchConfig::default(),
            include_hidden: true,
            max_depth: None,
        }
    }

    /// Scan configuration matching this tree.
    pub fn scan_config(&self) -> ScanConfig {
        let mut config = ScanConfig::new(&self.base_directory);
        config.project_root = Some(self.project_root.clone());
        config.exclude_patterns = self.exclude_patterns.clone();
        config.include_hidden = self.include_hidden;
        config.max_depth = self.max_depth;
        config
    }
}
