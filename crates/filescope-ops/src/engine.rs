//! The engine owning the active tree.
//!
//! Every mutation runs as one critical section: the tree is cloned, the
//! change applied to the copy, dependents and importance recomputed when the
//! graph moved, the copy saved, and only then swapped in. A failure at any
//! step leaves the active tree as it was.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use filescope_analyze::{DependencyExtractor, ranked_files, recalculate};
use filescope_core::path::normalize;
use filescope_core::{
    DEFAULT_MAX_FILE_SIZE, ExcludeRules, FileNode, FileTree, ScanError, ScanWarning, TreeConfig,
    TreeStats, WatchConfig, compile_pattern, display_name, query,
};
use filescope_scan::TreeScanner;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult, PersistError};
use crate::events::{EVENT_CAPACITY, TreeEvent};
use crate::mutate::{self, Mutator, NodeUpdate, UpdateOutcome};
use crate::persist::{TreeStore, TreeSummary, tree_filename};
use crate::watcher::{self, FsChange, WatchHandle, WatchStatus, WatchTarget};

/// Settings for [`Engine::create`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Document name; defaults to the project directory's name.
    pub filename: Option<String>,
    /// Root for root-relative imports; defaults to the scanned directory.
    pub project_root: Option<PathBuf>,
    pub exclude_patterns: Vec<String>,
    pub file_watching: WatchConfig,
    /// Keep dot-prefixed entries in scans and additions.
    pub include_hidden: bool,
    /// Deepest directory level scanned (None = unlimited).
    pub max_depth: Option<u32>,
    /// Worker threads for scans (0 = auto-detect).
    pub threads: usize,
    pub max_file_size: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            filename: None,
            project_root: None,
            exclude_patterns: Vec::new(),
            file_watching: WatchConfig::default(),
            include_hidden: true,
            max_depth: None,
            threads: 0,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

struct EngineState {
    tree: FileTree,
    rules: ExcludeRules,
    warnings: Vec<ScanWarning>,
}

/// Result of one mutation, before it is committed.
struct Commit<T> {
    value: T,
    dirty: bool,
    rescore: bool,
    events: Vec<TreeEvent>,
}

impl<T> Commit<T> {
    fn unchanged(value: T) -> Self {
        Self {
            value,
            dirty: false,
            rescore: false,
            events: Vec::new(),
        }
    }

    fn changed(value: T, events: Vec<TreeEvent>) -> Self {
        Self {
            value,
            dirty: true,
            rescore: false,
            events,
        }
    }

    fn rescored(mut self) -> Self {
        self.rescore = true;
        self
    }
}

struct Shared {
    state: Mutex<EngineState>,
    store: TreeStore,
    extractor: DependencyExtractor,
    events: broadcast::Sender<TreeEvent>,
    threads: usize,
    max_file_size: u64,
}

impl Shared {
    fn lock(&self) -> EngineResult<MutexGuard<'_, EngineState>> {
        self.state.lock().map_err(|_| EngineError::Poisoned)
    }

    fn emit(&self, events: impl IntoIterator<Item = TreeEvent>) {
        for event in events {
            // No receivers is fine.
            let _ = self.events.send(event);
        }
    }

    fn commit<T>(
        &self,
        op: impl FnOnce(&mut FileTree, &ExcludeRules) -> EngineResult<Commit<T>>,
    ) -> EngineResult<T> {
        let mut state = self.lock()?;
        let mut working = state.tree.clone();
        let Commit {
            value,
            dirty,
            rescore,
            mut events,
        } = op(&mut working, &state.rules)?;
        if !dirty {
            return Ok(value);
        }

        if rescore {
            recalculate(&mut working.root);
            events.push(TreeEvent::Recalculated);
        }
        let rules = if working.config.exclude_patterns != state.tree.config.exclude_patterns
            || working.config.include_hidden != state.tree.config.include_hidden
        {
            Some(build_rules(&working)?)
        } else {
            None
        };
        working.config.last_updated = Utc::now();
        self.store.save(&working)?;

        state.tree = working;
        if let Some(rules) = rules {
            state.rules = rules;
        }
        drop(state);

        self.emit(events);
        Ok(value)
    }

    fn add_node(&self, path: &Path) -> EngineResult<Vec<PathBuf>> {
        self.commit(|tree, rules| {
            let doc = self.store.path_for(&tree.config.filename)?;
            let added = Mutator::new(&self.extractor, rules)
                .ignoring(&doc)
                .add_node(tree, path)?;
            let events = if added.is_empty() {
                vec![TreeEvent::NodeUpdated(normalize(path, &tree.root.path))]
            } else {
                added.iter().cloned().map(TreeEvent::NodeAdded).collect()
            };
            Ok(Commit::changed(added, events).rescored())
        })
    }

    fn remove_node(&self, path: &Path) -> EngineResult<Vec<PathBuf>> {
        self.commit(|tree, _| {
            let removed = mutate::remove_node(tree, path)?;
            let events = removed.iter().cloned().map(TreeEvent::NodeRemoved).collect();
            Ok(Commit::changed(removed, events).rescored())
        })
    }

    fn update_node(&self, path: &Path, update: &NodeUpdate) -> EngineResult<UpdateOutcome> {
        self.commit(|tree, rules| {
            let outcome = Mutator::new(&self.extractor, rules).update_node(tree, path, update)?;
            let touched =
                update.summary.is_some() || update.importance.is_some() || outcome.refreshed;
            if !touched {
                return Ok(Commit::unchanged(outcome));
            }
            let event = TreeEvent::NodeUpdated(normalize(path, &tree.root.path));
            let commit = Commit::changed(outcome, vec![event]);
            Ok(if outcome.graph_changed {
                commit.rescored()
            } else {
                commit
            })
        })
    }

    fn rebuild(&self) -> EngineResult<TreeStats> {
        let mut state = self.lock()?;
        let doc = self.store.path_for(&state.tree.config.filename)?;
        let (mut root, warnings) =
            scan_tree(&state.tree.config, self.threads, self.max_file_size, &doc)?;

        let summaries: HashMap<&Path, &String> = state
            .tree
            .root
            .iter()
            .filter_map(|n| n.summary.as_ref().map(|s| (n.path.as_path(), s)))
            .collect();
        root.for_each_mut(|node| {
            if let Some(summary) = summaries.get(node.path.as_path()) {
                node.summary = Some((*summary).clone());
            }
        });

        let mut tree = FileTree::new(state.tree.config.clone(), root);
        tree.config.last_updated = Utc::now();
        self.store.save(&tree)?;

        let stats = tree.stats();
        state.tree = tree;
        state.warnings = warnings;
        drop(state);

        info!(files = stats.total_files, edges = stats.total_edges, "rebuilt tree");
        self.emit([TreeEvent::Rebuilt]);
        Ok(stats)
    }
}

impl WatchTarget for Shared {
    fn contains(&self, path: &Path) -> bool {
        self.lock()
            .map(|state| state.tree.get(path).is_some())
            .unwrap_or(false)
    }

    fn directories(&self) -> Vec<PathBuf> {
        self.lock()
            .map(|state| {
                state
                    .tree
                    .root
                    .iter()
                    .filter(|n| n.is_dir())
                    .map(|n| n.path.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn apply(&self, change: &FsChange) -> EngineResult<Vec<PathBuf>> {
        match change {
            FsChange::Created(path) => self.add_node(path),
            FsChange::Modified(path) => self
                .update_node(path, &NodeUpdate::refresh())
                .map(|_| Vec::new()),
            FsChange::Deleted(path) => self.remove_node(path),
        }
    }

    fn rebuild(&self) -> EngineResult<()> {
        Shared::rebuild(self).map(|_| ())
    }

    fn limit_reached(&self, limit: usize) {
        self.emit([TreeEvent::WatchLimitReached { limit }]);
    }

    fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }
}

fn build_extractor(max_file_size: u64) -> EngineResult<DependencyExtractor> {
    let extractor = DependencyExtractor::new().map_err(|e| ScanError::InvalidConfig {
        message: e.to_string(),
    })?;
    Ok(extractor.with_max_file_size(max_file_size))
}

fn build_rules(tree: &FileTree) -> EngineResult<ExcludeRules> {
    let patterns = &tree.config.exclude_patterns;
    ExcludeRules::new(&tree.root.path, patterns, !tree.config.include_hidden).map_err(|source| {
        let pattern = patterns
            .iter()
            .find(|p| compile_pattern(p).is_err())
            .cloned()
            .unwrap_or_default();
        EngineError::InvalidPattern { pattern, source }
    })
}

fn scan_tree(
    config: &TreeConfig,
    threads: usize,
    max_file_size: u64,
    doc: &Path,
) -> EngineResult<(FileNode, Vec<ScanWarning>)> {
    let mut scan = config.scan_config();
    scan.threads = threads;
    scan.max_file_size = max_file_size;

    let outcome = TreeScanner::new().ignore_path(doc).scan(&scan)?;
    let mut root = outcome.root;
    recalculate(&mut root);
    Ok((root, outcome.warnings))
}

fn default_filename(base: &Path) -> String {
    let name = display_name(base);
    tree_filename(&name).unwrap_or_else(|_| "tree.json".to_string())
}

/// Owner of one active tree, its store and its watcher.
pub struct Engine {
    shared: Arc<Shared>,
    watcher: tokio::sync::Mutex<Option<WatchHandle>>,
}

impl Engine {
    fn from_parts(
        tree: FileTree,
        warnings: Vec<ScanWarning>,
        store: TreeStore,
        threads: usize,
        max_file_size: u64,
    ) -> EngineResult<Self> {
        let rules = build_rules(&tree)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState {
                    tree,
                    rules,
                    warnings,
                }),
                store,
                extractor: build_extractor(max_file_size)?,
                events,
                threads,
                max_file_size,
            }),
            watcher: tokio::sync::Mutex::new(None),
        })
    }

    /// Scan `project_root`, score it, and save it into `store_dir`.
    pub fn create(
        project_root: impl AsRef<Path>,
        store_dir: impl Into<PathBuf>,
        options: EngineOptions,
    ) -> EngineResult<Self> {
        let project_root = project_root.as_ref();
        let base = project_root
            .canonicalize()
            .map_err(|e| ScanError::io(project_root, e))?;
        let filename = match &options.filename {
            Some(name) => tree_filename(name)?,
            None => default_filename(&base),
        };

        let mut config = TreeConfig::new(filename, &base);
        if let Some(root) = &options.project_root {
            config.project_root = root
                .canonicalize()
                .map_err(|e| ScanError::io(root, e))?;
        }
        config.exclude_patterns = options.exclude_patterns;
        config.file_watching = options.file_watching;
        config.include_hidden = options.include_hidden;
        config.max_depth = options.max_depth;

        let store = TreeStore::new(store_dir);
        let doc = store.path_for(&config.filename)?;
        let (root, warnings) = scan_tree(&config, options.threads, options.max_file_size, &doc)?;
        let tree = FileTree::new(config, root);
        store.save(&tree)?;

        info!(
            root = %base.display(),
            document = %doc.display(),
            files = tree.root.file_count(),
            warnings = warnings.len(),
            "created tree"
        );
        Self::from_parts(tree, warnings, store, options.threads, options.max_file_size)
    }

    /// Load the tree saved as `filename` in `store_dir`.
    pub fn open(store_dir: impl Into<PathBuf>, filename: &str) -> EngineResult<Self> {
        let store = TreeStore::new(store_dir);
        let tree = store.load(filename)?;
        Self::from_parts(tree, Vec::new(), store, 0, DEFAULT_MAX_FILE_SIZE)
    }

    /// Load the saved tree for `project_root`, scanning it when none exists.
    pub fn open_or_create(
        project_root: impl AsRef<Path>,
        store_dir: impl Into<PathBuf>,
        options: EngineOptions,
    ) -> EngineResult<Self> {
        let project_root = project_root.as_ref();
        let store_dir = store_dir.into();
        let filename = match &options.filename {
            Some(name) => tree_filename(name)?,
            None => {
                let base = project_root
                    .canonicalize()
                    .map_err(|e| ScanError::io(project_root, e))?;
                default_filename(&base)
            }
        };

        let store = TreeStore::new(&store_dir);
        match store.load(&filename) {
            Ok(tree) => {
                debug!(%filename, "opened saved tree");
                Self::from_parts(tree, Vec::new(), store, options.threads, options.max_file_size)
            }
            Err(PersistError::NotFound { .. }) => {
                let options = EngineOptions {
                    filename: Some(filename),
                    ..options
                };
                Self::create(project_root, store_dir, options)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the active tree with the saved tree `filename`.
    ///
    /// The watcher is stopped first and restarted when the new tree has
    /// watching enabled.
    pub async fn switch_tree(&self, filename: &str) -> EngineResult<()> {
        let tree = self.shared.store.load(filename)?;
        let rules = build_rules(&tree)?;
        let watching = tree.config.file_watching.enabled;

        self.stop_watching().await;
        {
            let mut state = self.shared.lock()?;
            info!(
                from = %state.tree.config.filename,
                to = %tree.config.filename,
                "switching tree"
            );
            state.tree = tree;
            state.rules = rules;
            state.warnings.clear();
        }
        self.shared.emit([TreeEvent::Rebuilt]);

        if watching {
            self.start_watching().await?;
        }
        Ok(())
    }

    /// Rescan the project, keeping summaries of surviving files.
    pub fn rebuild(&self) -> EngineResult<TreeStats> {
        self.shared.rebuild()
    }

    /// Stop the watcher and write the tree one last time.
    pub async fn shutdown(self) -> EngineResult<()> {
        self.stop_watching().await;
        let state = self.shared.lock()?;
        self.shared.store.save(&state.tree)?;
        info!(filename = %state.tree.config.filename, "shut down");
        Ok(())
    }

    /// Run `f` against the active tree.
    pub fn with_tree<R>(&self, f: impl FnOnce(&FileTree) -> R) -> EngineResult<R> {
        let state = self.shared.lock()?;
        Ok(f(&state.tree))
    }

    /// Copy of the active tree.
    pub fn tree(&self) -> EngineResult<FileTree> {
        self.with_tree(FileTree::clone)
    }

    /// Name of the active document.
    pub fn filename(&self) -> EngineResult<String> {
        self.with_tree(|tree| tree.config.filename.clone())
    }

    /// Location of the active document.
    pub fn document_path(&self) -> EngineResult<PathBuf> {
        let filename = self.filename()?;
        Ok(self.shared.store.path_for(&filename)?)
    }

    pub fn stats(&self) -> EngineResult<TreeStats> {
        self.with_tree(FileTree::stats)
    }

    /// Non-fatal problems from the last scan.
    pub fn warnings(&self) -> EngineResult<Vec<ScanWarning>> {
        let state = self.shared.lock()?;
        Ok(state.warnings.clone())
    }

    pub fn get_node(&self, path: impl AsRef<Path>) -> EngineResult<Option<FileNode>> {
        self.with_tree(|tree| {
            let path = normalize(path, tree.root_path());
            query::get_node(tree, &path).cloned()
        })
    }

    /// Every file, in tree order.
    pub fn list_all(&self) -> EngineResult<Vec<FileNode>> {
        self.with_tree(|tree| query::list_all(tree).into_iter().cloned().collect())
    }

    pub fn set_summary(&self, path: impl AsRef<Path>, text: Option<String>) -> EngineResult<()> {
        self.shared.commit(|tree, _| {
            let path = normalize(path, tree.root_path());
            query::set_summary(tree, &path, text)?;
            Ok(Commit::changed((), vec![TreeEvent::NodeUpdated(path)]))
        })
    }

    /// Override a node's importance until the next recalculation.
    pub fn set_importance(&self, path: impl AsRef<Path>, value: f64) -> EngineResult<()> {
        self.shared.commit(|tree, _| {
            let path = normalize(path, tree.root_path());
            query::set_importance(tree, &path, value)?;
            Ok(Commit::changed((), vec![TreeEvent::NodeUpdated(path)]))
        })
    }

    /// Recompute dependents and importance for the whole tree.
    pub fn recalculate(&self) -> EngineResult<()> {
        self.shared
            .commit(|_, _| Ok(Commit::changed((), Vec::new()).rescored()))
    }

    /// Add a file or directory; returns the inserted paths.
    pub fn add_node(&self, path: impl AsRef<Path>) -> EngineResult<Vec<PathBuf>> {
        self.shared.add_node(path.as_ref())
    }

    /// Remove a node and its subtree; returns the removed paths.
    pub fn remove_node(&self, path: impl AsRef<Path>) -> EngineResult<Vec<PathBuf>> {
        self.shared.remove_node(path.as_ref())
    }

    /// Remove everything matching `pattern` and exclude it from now on.
    pub fn exclude_and_remove(&self, pattern: &str) -> EngineResult<Vec<PathBuf>> {
        self.shared.commit(|tree, _| {
            let removed = mutate::exclude_and_remove(tree, pattern)?;
            let events = removed.iter().cloned().map(TreeEvent::NodeRemoved).collect();
            let commit = Commit::changed(removed, events);
            Ok(if commit.value.is_empty() {
                commit
            } else {
                commit.rescored()
            })
        })
    }

    pub fn update_node(
        &self,
        path: impl AsRef<Path>,
        update: &NodeUpdate,
    ) -> EngineResult<UpdateOutcome> {
        self.shared.update_node(path.as_ref(), update)
    }

    /// Highest scoring files, best first.
    pub fn important_files(
        &self,
        limit: Option<usize>,
        min_importance: f64,
    ) -> EngineResult<Vec<FileNode>> {
        self.with_tree(|tree| {
            ranked_files(&tree.root, limit, min_importance)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    pub fn dependencies_of(&self, path: impl AsRef<Path>) -> EngineResult<Vec<PathBuf>> {
        let result = self.with_tree(|tree| {
            let path = normalize(path, tree.root_path());
            query::dependencies_of(tree, &path)
        })?;
        Ok(result?)
    }

    pub fn dependents_of(&self, path: impl AsRef<Path>) -> EngineResult<Vec<PathBuf>> {
        let result = self.with_tree(|tree| {
            let path = normalize(path, tree.root_path());
            query::dependents_of(tree, &path)
        })?;
        Ok(result?)
    }

    /// Every tree saved in this engine's store.
    pub fn list_saved_trees(&self) -> EngineResult<Vec<TreeSummary>> {
        Ok(self.shared.store.list()?)
    }

    /// Delete a saved tree other than the active one.
    pub fn delete_saved_tree(&self, filename: &str) -> EngineResult<()> {
        let name = tree_filename(filename)?;
        if name == self.filename()? {
            return Err(EngineError::ActiveTree { filename: name });
        }
        Ok(self.shared.store.delete(&name)?)
    }

    /// Receive change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.shared.events.subscribe()
    }

    pub fn watch_config(&self) -> EngineResult<WatchConfig> {
        self.with_tree(|tree| tree.config.file_watching.clone())
    }

    /// Persist new watch settings, restarting a running watcher.
    pub async fn set_watch_config(&self, config: WatchConfig) -> EngineResult<()> {
        let enabled = config.enabled;
        self.shared.commit(|tree, _| {
            tree.config.file_watching = config;
            Ok(Commit::changed((), Vec::new()))
        })?;

        if self.stop_watching().await && enabled {
            self.start_watching().await?;
        }
        Ok(())
    }

    /// Start the watcher. Requires a tokio runtime; a no-op when running.
    pub async fn start_watching(&self) -> EngineResult<()> {
        let mut slot = self.watcher.lock().await;
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        let (root, doc, config) = {
            let state = self.shared.lock()?;
            (
                state.tree.root.path.clone(),
                self.shared.store.path_for(&state.tree.config.filename)?,
                state.tree.config.file_watching.clone(),
            )
        };
        *slot = Some(watcher::spawn(self.shared.clone(), root, doc, config)?);
        Ok(())
    }

    /// Stop the watcher; returns whether one was running.
    pub async fn stop_watching(&self) -> bool {
        let handle = self.watcher.lock().await.take();
        match handle {
            Some(handle) => {
                handle.stop().await;
                true
            }
            None => false,
        }
    }

    pub async fn watch_status(&self) -> WatchStatus {
        self.watcher
            .lock()
            .await
            .as_ref()
            .map(WatchHandle::status)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::write(root.join("a.ts"), "import { b } from './b';\n").unwrap();
        fs::write(root.join("b.ts"), "export const b = 1;\n").unwrap();
        (temp, root)
    }

    #[test]
    fn test_failed_mutation_leaves_tree_untouched() {
        let (_temp, root) = project();
        let engine = Engine::create(&root, root.join(".filescope"), EngineOptions::default()).unwrap();
        let before = engine.tree().unwrap();

        assert!(matches!(
            engine.remove_node(root.join("missing.ts")),
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            engine.exclude_and_remove("a["),
            Err(EngineError::InvalidPattern { .. })
        ));
        assert_eq!(engine.tree().unwrap(), before);
    }

    #[test]
    fn test_store_inside_tree_is_ignored() {
        let (_temp, root) = project();
        let options = EngineOptions {
            filename: Some("proj".into()),
            ..EngineOptions::default()
        };
        let engine = Engine::create(&root, &root, options).unwrap();
        let doc = engine.document_path().unwrap();
        assert_eq!(doc, root.join("proj.json"));
        assert!(doc.exists());
        assert!(engine.get_node(&doc).unwrap().is_none());
        assert!(matches!(
            engine.add_node(&doc),
            Err(EngineError::Excluded { .. })
        ));
    }

    #[test]
    fn test_relative_paths_resolve_against_root() {
        let (_temp, root) = project();
        let engine = Engine::create(&root, root.join(".filescope"), EngineOptions::default()).unwrap();
        assert_eq!(
            engine.dependencies_of("a.ts").unwrap(),
            vec![root.join("b.ts")]
        );
        engine.set_summary("./b.ts", Some("exports b".into())).unwrap();
        let b = engine.get_node(root.join("b.ts")).unwrap().unwrap();
        assert_eq!(b.summary.as_deref(), Some("exports b"));
    }

    #[test]
    fn test_hidden_and_depth_options_shape_the_tree() {
        let (_temp, root) = project();
        fs::write(root.join(".env.ts"), "").unwrap();
        fs::create_dir_all(root.join("lib/deep")).unwrap();
        fs::write(root.join("lib/deep/c.ts"), "").unwrap();
        let options = EngineOptions {
            include_hidden: false,
            max_depth: Some(1),
            ..EngineOptions::default()
        };
        let engine = Engine::create(&root, root.join(".filescope"), options).unwrap();

        let config = engine.tree().unwrap().config;
        assert!(!config.include_hidden);
        assert_eq!(config.max_depth, Some(1));
        assert!(engine.get_node(root.join(".env.ts")).unwrap().is_none());
        assert!(engine.get_node(root.join("lib")).unwrap().is_some());
        assert!(engine.get_node(root.join("lib/deep/c.ts")).unwrap().is_none());
        assert!(matches!(
            engine.add_node(root.join(".env.ts")),
            Err(EngineError::Excluded { .. })
        ));

        let reopened = Engine::open(root.join(".filescope"), &engine.filename().unwrap()).unwrap();
        reopened.rebuild().unwrap();
        assert!(reopened.get_node(root.join(".env.ts")).unwrap().is_none());
    }

    #[test]
    fn test_default_filename_uses_directory_name() {
        assert_eq!(default_filename(Path::new("/work/my-app")), "my-app.json");
        assert_eq!(default_filename(Path::new("/")), "tree.json");
    }
}
