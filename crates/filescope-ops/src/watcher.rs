//! Live file watching.
//!
//! Raw events from the OS are collapsed per path by a [`Debouncer`]: each path
//! is either idle or pending, and a pending path fires once after the quiet
//! period elapses without another event for it. A fired path is classified
//! by looking at the disk and the tree, then handed to a [`WatchTarget`] on
//! the blocking pool. Nodes removed from the tree by any caller drop their
//! pending timers, so a removal is never undone by a late event.

use std::collections::{HashMap, HashSet};
use std::future::poll_fn;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use filescope_core::WatchConfig;
use filescope_core::path::{is_hidden, is_within, paths_equal};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::Key;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::events::TreeEvent;

/// A settled change to one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
    /// On disk but not in the tree.
    Created(PathBuf),
    /// On disk and in the tree.
    Modified(PathBuf),
    /// In the tree but gone from disk.
    Deleted(PathBuf),
}

impl FsChange {
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Deleted(p) => p,
        }
    }

    /// Whether `config` asks for this kind of change to be applied.
    pub fn is_enabled(&self, config: &WatchConfig) -> bool {
        match self {
            Self::Created(_) => config.watch_for_new_files,
            Self::Modified(_) => config.watch_for_changed,
            Self::Deleted(_) => config.watch_for_deleted,
        }
    }
}

/// Classify a fired path; `None` when it is neither on disk nor in the tree.
pub fn classify(path: PathBuf, exists: bool, in_tree: bool) -> Option<FsChange> {
    match (exists, in_tree) {
        (true, false) => Some(FsChange::Created(path)),
        (true, true) => Some(FsChange::Modified(path)),
        (false, true) => Some(FsChange::Deleted(path)),
        (false, false) => None,
    }
}

/// The tree a watcher keeps in sync.
///
/// Every method may block; the watcher only calls them from the blocking
/// pool.
pub trait WatchTarget: Send + Sync + 'static {
    /// Whether `path` is a node of the tree.
    fn contains(&self, path: &Path) -> bool;

    /// Every directory node of the tree, root first.
    fn directories(&self) -> Vec<PathBuf>;

    /// Apply `change`, returning the paths it added or removed.
    fn apply(&self, change: &FsChange) -> EngineResult<Vec<PathBuf>>;

    /// Replace the tree with a fresh scan.
    fn rebuild(&self) -> EngineResult<()>;

    /// Called once when the directory limit stops new registrations.
    fn limit_reached(&self, limit: usize);

    /// Change notifications of the tree.
    fn subscribe(&self) -> broadcast::Receiver<TreeEvent>;
}

/// Per-path timers keyed by path.
#[derive(Debug)]
pub struct Debouncer {
    queue: DelayQueue<PathBuf>,
    keys: HashMap<PathBuf, Key>,
    delay: Duration,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            queue: DelayQueue::new(),
            keys: HashMap::new(),
            delay,
        }
    }

    /// Start the timer for `path`, or restart it if one is pending.
    pub fn push(&mut self, path: PathBuf) {
        match self.keys.get(&path) {
            Some(key) => self.queue.reset(key, self.delay),
            None => {
                let key = self.queue.insert(path.clone(), self.delay);
                self.keys.insert(path, key);
            }
        }
    }

    /// Drop pending timers for `prefix` and everything under it.
    pub fn cancel_under(&mut self, prefix: &Path) -> usize {
        let doomed: Vec<PathBuf> = self
            .keys
            .keys()
            .filter(|p| is_within(p, prefix))
            .cloned()
            .collect();
        for path in &doomed {
            if let Some(key) = self.keys.remove(path) {
                self.queue.remove(&key);
            }
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.keys.clear();
    }

    /// Wait for the next path whose quiet period elapsed.
    ///
    /// Resolves to `None` immediately when nothing is pending.
    pub async fn next_expired(&mut self) -> Option<PathBuf> {
        let expired = poll_fn(|cx| self.queue.poll_expired(cx)).await?;
        let path = expired.into_inner();
        self.keys.remove(&path);
        Some(path)
    }
}

/// Snapshot of a running watcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStatus {
    pub active: bool,
    pub watched_directories: usize,
    pub limit_reached: bool,
    pub pending_events: usize,
    pub fired_events: u64,
}

#[derive(Debug, Default)]
struct StatusCells {
    active: AtomicBool,
    watched_directories: AtomicUsize,
    limit_reached: AtomicBool,
    pending_events: AtomicUsize,
    fired_events: AtomicU64,
}

impl StatusCells {
    fn snapshot(&self) -> WatchStatus {
        WatchStatus {
            active: self.active.load(Ordering::Relaxed),
            watched_directories: self.watched_directories.load(Ordering::Relaxed),
            limit_reached: self.limit_reached.load(Ordering::Relaxed),
            pending_events: self.pending_events.load(Ordering::Relaxed),
            fired_events: self.fired_events.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running watcher task.
pub struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    status: Arc<StatusCells>,
}

impl WatchHandle {
    pub fn status(&self) -> WatchStatus {
        self.status.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task and drop every pending timer.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "watcher task failed");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start watching every directory of `target`.
///
/// Must be called from within a tokio runtime. `ignored` is never reported
/// (the persisted document).
pub fn spawn<T: WatchTarget>(
    target: Arc<T>,
    root: PathBuf,
    ignored: PathBuf,
    config: WatchConfig,
) -> EngineResult<WatchHandle> {
    let runtime = tokio::runtime::Handle::try_current()?;
    let (tx, rx) = mpsc::unbounded_channel();
    let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let _ = tx.send(result);
    })?;

    let events = target.subscribe();
    let status = Arc::new(StatusCells::default());
    let mut task = WatchTask {
        debouncer: Debouncer::new(Duration::from_millis(config.debounce_ms)),
        target,
        root,
        ignored,
        config,
        watcher,
        watched: HashSet::new(),
        status: status.clone(),
    };

    task.watcher
        .watch(&task.root, RecursiveMode::NonRecursive)?;
    task.watched.insert(task.root.clone());
    for dir in task.target.directories() {
        task.watch_dir(&dir);
    }
    status
        .watched_directories
        .store(task.watched.len(), Ordering::Relaxed);
    status.active.store(true, Ordering::Relaxed);
    info!(
        root = %task.root.display(),
        directories = task.watched.len(),
        debounce_ms = task.config.debounce_ms,
        "watching"
    );

    let cancel = CancellationToken::new();
    let handle = runtime.spawn(task.run(rx, events, cancel.clone()));
    Ok(WatchHandle {
        cancel,
        task: handle,
        status,
    })
}

struct WatchTask<T> {
    target: Arc<T>,
    root: PathBuf,
    ignored: PathBuf,
    config: WatchConfig,
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
    debouncer: Debouncer,
    status: Arc<StatusCells>,
}

impl<T: WatchTarget> WatchTask<T> {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        mut events: broadcast::Receiver<TreeEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            // Removals are drained before any timer may fire.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(TreeEvent::NodeRemoved(path)) => self.forget(&path),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "watcher missed tree events, dropping pending timers");
                        self.debouncer.clear();
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(result) = rx.recv() => self.on_raw(result).await,
                Some(path) = self.debouncer.next_expired(), if !self.debouncer.is_empty() => {
                    self.fire(path).await;
                }
                else => break,
            }
            self.status
                .pending_events
                .store(self.debouncer.len(), Ordering::Relaxed);
        }

        self.debouncer.clear();
        self.status.pending_events.store(0, Ordering::Relaxed);
        self.status.active.store(false, Ordering::Relaxed);
        debug!(root = %self.root.display(), "watcher stopped");
    }

    async fn on_raw(&mut self, result: notify::Result<Event>) {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "watch error");
                return;
            }
        };

        if event.need_rescan() {
            warn!("watcher lost events");
            if self.config.auto_rebuild_tree {
                self.rebuild().await;
            }
            return;
        }
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }
        for path in event.paths {
            if self.is_relevant(&path) {
                self.debouncer.push(path);
            }
        }
    }

    fn is_relevant(&self, path: &Path) -> bool {
        if paths_equal(path, &self.ignored) || paths_equal(path, &self.root) {
            return false;
        }
        if !is_within(path, &self.root) {
            return false;
        }
        !(self.config.ignore_dot_files && is_hidden(path, &self.root))
    }

    async fn fire(&mut self, path: PathBuf) {
        self.status.fired_events.fetch_add(1, Ordering::Relaxed);
        let target = self.target.clone();
        let config = self.config.clone();
        let result = tokio::task::spawn_blocking(move || {
            let in_tree = target.contains(&path);
            let exists = path_exists(&path);
            let Some(change) = classify(path, exists, in_tree) else {
                return Ok(None);
            };
            if !change.is_enabled(&config) {
                return Ok(None);
            }
            let touched = target.apply(&change)?;
            Ok::<_, EngineError>(Some((change, touched)))
        })
        .await;

        match result {
            Ok(Ok(Some((change, touched)))) => {
                debug!(?change, touched = touched.len(), "applied change");
                match change {
                    FsChange::Created(_) => {
                        for path in touched.iter().filter(|p| p.is_dir()) {
                            self.watch_dir(path);
                        }
                    }
                    FsChange::Deleted(_) => {
                        for path in &touched {
                            self.forget(path);
                        }
                    }
                    FsChange::Modified(_) => {}
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(EngineError::Excluded { path })) => {
                debug!(path = %path.display(), "ignoring excluded path");
            }
            Ok(Err(e)) => warn!(error = %e, "failed to apply change"),
            Err(e) => warn!(error = %e, "change task failed"),
        }
    }

    /// Drop timers and watches for a path that left the tree.
    fn forget(&mut self, path: &Path) {
        let cancelled = self.debouncer.cancel_under(path);
        if cancelled > 0 {
            debug!(path = %path.display(), cancelled, "cancelled pending events");
        }
        if self.watched.remove(path) {
            let _ = self.watcher.unwatch(path);
            self.status
                .watched_directories
                .store(self.watched.len(), Ordering::Relaxed);
        }
    }

    async fn rebuild(&mut self) {
        self.debouncer.clear();
        let target = self.target.clone();
        let result = tokio::task::spawn_blocking(move || {
            target.rebuild()?;
            Ok::<_, EngineError>(target.directories())
        })
        .await;
        match result {
            Ok(Ok(directories)) => {
                for dir in directories {
                    self.watch_dir(&dir);
                }
            }
            Ok(Err(e)) => warn!(error = %e, "rebuild failed"),
            Err(e) => warn!(error = %e, "rebuild task failed"),
        }
    }

    fn watch_dir(&mut self, dir: &Path) {
        if self.watched.contains(dir) || !self.is_relevant(dir) {
            return;
        }
        if self.watched.len() >= self.config.max_watched_directories {
            if !self.status.limit_reached.swap(true, Ordering::Relaxed) {
                warn!(
                    limit = self.config.max_watched_directories,
                    "directory watch limit reached, new directories are not watched"
                );
                self.target.limit_reached(self.config.max_watched_directories);
            }
            return;
        }
        match self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                self.watched.insert(dir.to_path_buf());
                self.status
                    .watched_directories
                    .store(self.watched.len(), Ordering::Relaxed);
            }
            Err(e) => warn!(path = %dir.display(), error = %e, "cannot watch directory"),
        }
    }
}

fn path_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}
