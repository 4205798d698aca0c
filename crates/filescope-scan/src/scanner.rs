//! JWalk-based parallel directory scanner.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jwalk::{Parallelism, WalkDirGeneric};
use rayon::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use filescope_analyze::{DependencyExtractor, ExtractContext, ExtractError, Extraction};
use filescope_core::path::{is_within, normalize, paths_equal};
use filescope_core::{
    ExcludeRules, FileNode, ScanConfig, ScanError, ScanWarning, TreeStats, WarningKind,
    modified_time,
};

use crate::progress::{ProgressTracker, ScanPhase, ScanProgress};
use crate::visited::VisitedDirs;

/// Files between two progress snapshots.
const PROGRESS_INTERVAL: u64 = 1000;

/// jwalk client state: nothing per directory read; per entry, the canonical
/// path of a directory that was already visited under another name.
type WalkState = ((), Option<PathBuf>);

/// Result of a completed scan.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Root directory node with dependencies extracted. `dependents` and
    /// `importance` are left for the caller to compute.
    pub root: FileNode,
    /// Project root used to resolve root-relative references.
    pub project_root: PathBuf,
    pub stats: TreeStats,
    /// Non-fatal problems encountered on the way.
    pub warnings: Vec<ScanWarning>,
    pub duration: Duration,
}

/// Scanner using jwalk for parallel traversal and rayon for extraction.
pub struct TreeScanner {
    progress_tx: broadcast::Sender<ScanProgress>,
    ignored: Vec<PathBuf>,
}

impl TreeScanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            progress_tx,
            ignored: Vec::new(),
        }
    }

    /// Never include `path` in a scan, whatever the exclusion rules say.
    pub fn ignore_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ignored.push(path.into());
        self
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Perform a scan of the given path.
    pub fn scan(&self, config: &ScanConfig) -> Result<ScanOutcome, ScanError> {
        let start = Instant::now();
        let root_path = config
            .root
            .canonicalize()
            .map_err(|e| ScanError::io(&config.root, e))?;

        // Verify root is a directory
        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory { path: root_path });
        }

        let project_root = resolve_project_root(config, &root_path);
        let rules = ExcludeRules::new(&root_path, &config.exclude_patterns, !config.include_hidden)
            .map_err(|e| ScanError::InvalidConfig {
                message: format!("invalid exclude pattern: {e}"),
            })?;
        let extractor = DependencyExtractor::new()
            .map_err(|e| ScanError::InvalidConfig {
                message: e.to_string(),
            })?
            .with_max_file_size(config.max_file_size);

        info!(root = %root_path.display(), "scanning");
        let mut tracker = ProgressTracker::new();
        let mut warnings = Vec::new();

        let mut entries = self.collect_entries(config, &root_path, rules, &mut tracker, &mut warnings);
        let mut root = build_node(&root_path, &mut entries);

        tracker.set_phase(ScanPhase::Extracting);
        self.publish(&tracker);

        let ctx = ExtractContext::with_project_root(&root_path, &project_root);
        let mut results = extract_all(&root, &extractor, &ctx, config.threads)?;
        let mut extracted = 0usize;
        root.for_each_mut(|node| match results.remove(&node.path) {
            Some(Ok(extraction)) => {
                extraction.apply_to(node);
                extracted += 1;
            }
            Some(Err(err)) => {
                warn!(path = %err.path().display(), error = %err, "dependency extraction failed");
                warnings.push(err.into_warning());
            }
            None => {}
        });
        tracker.record_extracted(extracted);

        let stats = TreeStats::collect(&root);
        tracker.set_errors(warnings.len());
        tracker.set_phase(ScanPhase::Done);
        self.publish(&tracker);

        let duration = start.elapsed();
        info!(
            files = stats.total_files,
            dirs = stats.total_dirs,
            edges = stats.total_edges,
            warnings = warnings.len(),
            elapsed_ms = duration.as_millis() as u64,
            "scan complete"
        );

        Ok(ScanOutcome {
            root,
            project_root,
            stats,
            warnings,
            duration,
        })
    }

    fn publish(&self, tracker: &ProgressTracker) {
        let _ = self.progress_tx.send(tracker.snapshot());
    }

    /// Collect all entries using jwalk, grouped by parent directory.
    fn collect_entries(
        &self,
        config: &ScanConfig,
        root_path: &Path,
        rules: ExcludeRules,
        tracker: &mut ProgressTracker,
        warnings: &mut Vec<ScanWarning>,
    ) -> HashMap<PathBuf, Vec<EntryInfo>> {
        let parallelism = match config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let visited = Arc::new(VisitedDirs::new());
        let root = root_path.to_path_buf();
        let rules = Arc::new(rules);
        let ignored = Arc::new(self.ignored.clone());

        let walker = WalkDirGeneric::<WalkState>::new(root_path)
            .parallelism(parallelism)
            .skip_hidden(false)
            .follow_links(config.follow_symlinks)
            .min_depth(0)
            .max_depth(config.max_depth.map(|d| d as usize).unwrap_or(usize::MAX))
            .process_read_dir(move |depth, _dir, _state, children| {
                // The root itself arrives without a depth.
                if depth.is_none() {
                    return;
                }
                children.retain(|result| match result {
                    Ok(entry) => {
                        let path = entry.path();
                        !rules.is_excluded(&path) && !ignored.iter().any(|p| paths_equal(p, &path))
                    }
                    Err(_) => true,
                });
                for entry in children.iter_mut().flatten() {
                    if !entry.file_type().is_dir() {
                        continue;
                    }
                    let path = entry.path();
                    let Ok(canonical) = std::fs::canonicalize(&path) else {
                        continue;
                    };
                    if paths_equal(&canonical, &path) {
                        continue;
                    }
                    // Reached through a link. A target inside the root is
                    // always kept under its real path; targets outside it
                    // are entered once.
                    if is_within(&canonical, &root) || !visited.track(canonical.clone()) {
                        entry.read_children_path = None;
                        entry.client_state = Some(canonical);
                    }
                }
            });

        let mut entries_by_parent: HashMap<PathBuf, Vec<EntryInfo>> = HashMap::new();

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    let warning = match err.io_error() {
                        Some(io) => ScanWarning::from_io(path, io),
                        None => ScanWarning::new(path, err.to_string(), WarningKind::ReadError),
                    };
                    warn!(path = %warning.path.display(), "{}", warning.message);
                    warnings.push(warning);
                    continue;
                }
            };

            if entry.depth() == 0 {
                continue;
            }
            let path = entry.path();

            if let Some(target) = &entry.client_state {
                let warning = ScanWarning::symlink_loop(&path, target);
                warn!(path = %path.display(), "{}", warning.message);
                warnings.push(warning);
                continue;
            }

            let file_type = entry.file_type();
            let info = if file_type.is_dir() {
                tracker.record_dir();
                EntryInfo {
                    path,
                    is_dir: true,
                    modified: None,
                }
            } else if file_type.is_file() {
                let modified = match entry.metadata() {
                    Ok(metadata) => modified_time(&metadata),
                    Err(err) => {
                        warnings.push(ScanWarning::new(
                            &path,
                            err.to_string(),
                            WarningKind::MetadataError,
                        ));
                        None
                    }
                };
                EntryInfo {
                    path,
                    is_dir: false,
                    modified,
                }
            } else if file_type.is_symlink() {
                // Unfollowed link: keep it when it points at a file.
                match std::fs::metadata(&path) {
                    Ok(metadata) if metadata.is_file() => EntryInfo {
                        path,
                        is_dir: false,
                        modified: modified_time(&metadata),
                    },
                    Ok(_) => {
                        debug!(path = %path.display(), "not following directory link");
                        continue;
                    }
                    Err(_) => {
                        let warning = ScanWarning::broken_symlink(&path);
                        warn!(path = %path.display(), "{}", warning.message);
                        warnings.push(warning);
                        continue;
                    }
                }
            } else {
                debug!(path = %path.display(), "skipping special file");
                continue;
            };

            if !info.is_dir {
                tracker.record_file(&info.path);
                if tracker.files_scanned() % PROGRESS_INTERVAL == 0 {
                    tracker.set_errors(warnings.len());
                    self.publish(tracker);
                }
            }

            if let Some(parent) = info.path.parent() {
                entries_by_parent
                    .entry(parent.to_path_buf())
                    .or_default()
                    .push(info);
            }
        }

        entries_by_parent
    }
}

impl Default for TreeScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan `config.root` with a fresh scanner.
pub fn scan(config: &ScanConfig) -> Result<ScanOutcome, ScanError> {
    TreeScanner::new().scan(config)
}

/// Temporary struct for collecting entry information.
struct EntryInfo {
    path: PathBuf,
    is_dir: bool,
    modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// Recursively build a directory node and its children, sorted by name.
fn build_node(path: &Path, entries_by_parent: &mut HashMap<PathBuf, Vec<EntryInfo>>) -> FileNode {
    let mut node = FileNode::new_directory(path);

    for entry in entries_by_parent.remove(path).unwrap_or_default() {
        let child = if entry.is_dir {
            build_node(&entry.path, entries_by_parent)
        } else {
            FileNode::new_file(entry.path, entry.modified)
        };
        node.children.push(child);
    }

    node.children.sort_by(|a, b| a.name.cmp(&b.name));
    node
}

fn resolve_project_root(config: &ScanConfig, root_path: &Path) -> PathBuf {
    match &config.project_root {
        Some(project_root) => {
            let normalized = normalize(project_root, root_path);
            normalized.canonicalize().unwrap_or(normalized)
        }
        None => root_path.to_path_buf(),
    }
}

type ExtractResults = HashMap<PathBuf, Result<Extraction, ExtractError>>;

/// Extract every file of the tree in parallel, bounded by `threads` when set.
fn extract_all(
    root: &FileNode,
    extractor: &DependencyExtractor,
    ctx: &ExtractContext<'_>,
    threads: usize,
) -> Result<ExtractResults, ScanError> {
    let files: Vec<&Path> = root.files().map(|n| n.path.as_path()).collect();
    let run = || {
        files
            .par_iter()
            .map(|path| (path.to_path_buf(), extractor.extract_file(path, ctx)))
            .collect::<ExtractResults>()
    };

    if threads == 0 {
        return Ok(run());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })?;
    Ok(pool.install(run))
}
