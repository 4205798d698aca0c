use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use filescope_ops::{
    Engine, EngineError, EngineOptions, NodeUpdate, PersistError, TreeEvent, WatchConfig,
};
use tempfile::TempDir;

struct Project {
    _temp: TempDir,
    root: PathBuf,
    store: PathBuf,
}

impl Project {
    fn new(files: &[(&str, &str)]) -> Self {
        let temp = TempDir::new().unwrap();
        let base = temp.path().canonicalize().unwrap();
        let root = base.join("proj");
        for (name, content) in files {
            let path = root.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        Self {
            _temp: temp,
            root,
            store: base.join("store"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn create(&self) -> Engine {
        Engine::create(&self.root, &self.store, EngineOptions::default()).unwrap()
    }
}

fn two_files() -> Project {
    Project::new(&[
        ("src/a.ts", "import { b } from './b';\n"),
        ("src/b.ts", "export const b = 2;\n"),
    ])
}

#[test]
fn test_create_lists_every_file() {
    let project = two_files();
    let engine = project.create();

    let files: Vec<PathBuf> = engine
        .list_all()
        .unwrap()
        .into_iter()
        .filter(|n| n.is_file())
        .map(|n| n.path)
        .collect();
    assert_eq!(files, vec![project.path("src/a.ts"), project.path("src/b.ts")]);
    assert_eq!(engine.stats().unwrap().total_files, 2);
}

#[test]
fn test_import_makes_target_more_important() {
    let project = two_files();
    let engine = project.create();

    let a = engine.get_node(project.path("src/a.ts")).unwrap().unwrap();
    let b = engine.get_node(project.path("src/b.ts")).unwrap().unwrap();
    assert_eq!(a.dependencies.iter().collect::<Vec<_>>(), vec![&b.path]);
    assert_eq!(b.dependents.iter().collect::<Vec<_>>(), vec![&a.path]);
    assert!(b.importance > a.importance);

    let ranked = engine.important_files(Some(1), 0.0).unwrap();
    assert_eq!(ranked[0].path, b.path);
}

#[test]
fn test_save_then_load_reproduces_tree() {
    let project = two_files();
    let engine = project.create();
    engine
        .set_summary(project.path("src/b.ts"), Some("Shared constant".into()))
        .unwrap();
    let saved = engine.tree().unwrap();
    let filename = engine.filename().unwrap();
    assert_eq!(filename, "proj.json");

    let reopened = Engine::open(&project.store, &filename).unwrap();
    let loaded = reopened.tree().unwrap();
    assert_eq!(loaded.root, saved.root);
    assert_eq!(loaded.config, saved.config);
}

#[test]
fn test_add_then_remove_restores_other_nodes() {
    let project = two_files();
    let engine = project.create();
    let before = engine.tree().unwrap().root;

    let c = project.path("src/c.ts");
    fs::write(&c, "import { b } from './b';\n").unwrap();
    assert_eq!(engine.add_node(&c).unwrap(), vec![c.clone()]);
    let b = engine.get_node(project.path("src/b.ts")).unwrap().unwrap();
    assert!(b.dependents.contains(&c));

    assert_eq!(engine.remove_node(&c).unwrap(), vec![c.clone()]);
    assert_eq!(engine.tree().unwrap().root, before);
}

#[test]
fn test_exclude_and_remove_test_files() {
    let project = Project::new(&[
        ("src/x.ts", "export const x = 1;\n"),
        ("src/x.test.ts", "import { x } from './x';\n"),
        ("src/y.ts", "import { x } from './x';\nimport './x.test';\n"),
    ]);
    let engine = project.create();
    let x = project.path("src/x.ts");
    let x_test = project.path("src/x.test.ts");
    let y = project.path("src/y.ts");
    assert!(engine.dependents_of(&x).unwrap().contains(&x_test));

    let removed = engine.exclude_and_remove("*.test.ts").unwrap();
    assert_eq!(removed, vec![x_test.clone()]);

    assert!(engine.get_node(&x_test).unwrap().is_none());
    assert!(engine.get_node(&x).unwrap().is_some());
    assert_eq!(engine.dependents_of(&x).unwrap(), vec![y.clone()]);
    assert_eq!(engine.dependencies_of(&y).unwrap(), vec![x.clone()]);

    // The pattern survives a reload and keeps the file out of later scans.
    let reopened = Engine::open(&project.store, "proj").unwrap();
    let tree = reopened.tree().unwrap();
    assert_eq!(tree.config.exclude_patterns, vec!["*.test.ts".to_string()]);
    reopened.rebuild().unwrap();
    assert!(reopened.get_node(&x_test).unwrap().is_none());
    assert!(matches!(
        reopened.add_node(&x_test),
        Err(EngineError::Excluded { .. })
    ));
}

#[tokio::test]
async fn test_invalid_document_leaves_engine_untouched() {
    let project = two_files();
    let engine = project.create();
    let before = engine.tree().unwrap();

    let mut json = serde_json::to_value(&before).unwrap();
    json["config"].as_object_mut().unwrap().remove("baseDirectory");
    fs::write(project.store.join("broken.json"), json.to_string()).unwrap();

    let err = engine.switch_tree("broken").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Persist(PersistError::Validation { .. })
    ));
    assert_eq!(engine.tree().unwrap(), before);

    assert!(matches!(
        engine.switch_tree("absent").await,
        Err(EngineError::Persist(PersistError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn test_switch_between_saved_trees() {
    let first = two_files();
    let engine = first.create();

    let second = Project::new(&[("lib/main.py", "import util\n"), ("lib/util.py", "")]);
    let options = EngineOptions {
        filename: Some("second".into()),
        ..EngineOptions::default()
    };
    Engine::create(&second.root, &first.store, options).unwrap();

    let names: Vec<_> = engine
        .list_saved_trees()
        .unwrap()
        .into_iter()
        .map(|s| s.filename)
        .collect();
    assert_eq!(names, vec!["proj.json", "second.json"]);

    let mut events = engine.subscribe();
    engine.switch_tree("second").await.unwrap();
    assert_eq!(events.recv().await.unwrap(), TreeEvent::Rebuilt);
    assert!(engine.get_node(second.path("lib/util.py")).unwrap().is_some());

    assert!(matches!(
        engine.delete_saved_tree("second"),
        Err(EngineError::ActiveTree { .. })
    ));
    engine.delete_saved_tree("proj").unwrap();
    assert_eq!(engine.list_saved_trees().unwrap().len(), 1);
}

#[test]
fn test_mutations_publish_events() {
    let project = two_files();
    let engine = project.create();
    let mut events = engine.subscribe();

    let a = project.path("src/a.ts");
    engine
        .update_node(
            &a,
            &NodeUpdate {
                summary: Some(Some("Entry".into())),
                ..NodeUpdate::default()
            },
        )
        .unwrap();
    engine.remove_node(project.path("src/b.ts")).unwrap();

    assert_eq!(events.try_recv().unwrap(), TreeEvent::NodeUpdated(a));
    assert_eq!(
        events.try_recv().unwrap(),
        TreeEvent::NodeRemoved(project.path("src/b.ts"))
    );
    assert_eq!(events.try_recv().unwrap(), TreeEvent::Recalculated);
    assert!(events.try_recv().is_err());
}

#[test]
fn test_rebuild_keeps_summaries() {
    let project = two_files();
    let engine = project.create();
    let b = project.path("src/b.ts");
    engine.set_summary(&b, Some("constants".into())).unwrap();
    fs::write(project.path("src/c.ts"), "import './a';\n").unwrap();

    let stats = engine.rebuild().unwrap();
    assert_eq!(stats.total_files, 3);
    let node = engine.get_node(&b).unwrap().unwrap();
    assert_eq!(node.summary.as_deref(), Some("constants"));
}

async fn wait_for(engine: &Engine, path: &Path, present: bool) -> bool {
    for _ in 0..100 {
        if engine.get_node(path).unwrap().is_some() == present {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_tracks_created_and_deleted_files() {
    let project = two_files();
    let options = EngineOptions {
        file_watching: WatchConfig {
            enabled: true,
            debounce_ms: 50,
            ..WatchConfig::default()
        },
        ..EngineOptions::default()
    };
    let engine = Engine::create(&project.root, &project.store, options).unwrap();
    engine.start_watching().await.unwrap();
    let status = engine.watch_status().await;
    assert!(status.active);
    assert_eq!(status.watched_directories, 2);

    let c = project.path("src/c.ts");
    fs::write(&c, "import { b } from './b';\n").unwrap();
    assert!(wait_for(&engine, &c, true).await);
    let b = project.path("src/b.ts");
    assert!(engine.dependents_of(&b).unwrap().contains(&c));

    fs::write(project.path("src/.hidden.ts"), "").unwrap();
    fs::remove_file(&c).unwrap();
    assert!(wait_for(&engine, &c, false).await);
    assert!(!engine.dependents_of(&b).unwrap().contains(&c));
    assert!(engine.get_node(project.path("src/.hidden.ts")).unwrap().is_none());

    engine.shutdown().await.unwrap();
}

fn watching(debounce_ms: u64, config: WatchConfig) -> EngineOptions {
    EngineOptions {
        file_watching: WatchConfig {
            enabled: true,
            debounce_ms,
            ..config
        },
        ..EngineOptions::default()
    }
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removed_node_is_not_restored_by_pending_change() {
    let project = two_files();
    let options = watching(300, WatchConfig::default());
    let engine = Engine::create(&project.root, &project.store, options).unwrap();
    engine.start_watching().await.unwrap();

    let b = project.path("src/b.ts");
    fs::write(&b, "export const b = 3;\n").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.remove_node(&b).unwrap(), vec![b.clone()]);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(engine.get_node(&b).unwrap().is_none());
    assert!(engine.dependencies_of(project.path("src/a.ts")).unwrap().is_empty());
    assert_eq!(engine.watch_status().await.pending_events, 0);

    engine.shutdown().await.unwrap();
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disabled_change_kinds_are_ignored() {
    let project = two_files();
    let config = WatchConfig {
        watch_for_new_files: false,
        ..WatchConfig::default()
    };
    let engine =
        Engine::create(&project.root, &project.store, watching(50, config)).unwrap();
    engine.start_watching().await.unwrap();

    let c = project.path("src/c.ts");
    fs::write(&c, "export const c = 1;\n").unwrap();
    let b = project.path("src/b.ts");
    fs::remove_file(&b).unwrap();

    // Deletions are still applied, so the created file had its turn too.
    assert!(wait_for(&engine, &b, false).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(engine.get_node(&c).unwrap().is_none());
    assert!(engine.watch_status().await.fired_events >= 2);

    engine.shutdown().await.unwrap();
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watch_limit_is_reported_once() {
    let project = two_files();
    let config = WatchConfig {
        max_watched_directories: 1,
        ..WatchConfig::default()
    };
    let engine =
        Engine::create(&project.root, &project.store, watching(50, config)).unwrap();
    let mut events = engine.subscribe();
    engine.start_watching().await.unwrap();

    let status = engine.watch_status().await;
    assert!(status.limit_reached);
    assert_eq!(status.watched_directories, 1);

    // A directory created later is added to the tree but not watched.
    let lib = project.path("lib");
    fs::create_dir(&lib).unwrap();
    assert!(wait_for(&engine, &lib, true).await);
    assert_eq!(engine.watch_status().await.watched_directories, 1);

    let mut reports = 0;
    while let Ok(event) = events.try_recv() {
        if event == (TreeEvent::WatchLimitReached { limit: 1 }) {
            reports += 1;
        }
    }
    assert_eq!(reports, 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_watch_config_is_persisted() {
    let project = two_files();
    let engine = project.create();
    assert!(!engine.watch_config().unwrap().enabled);

    let config = WatchConfig {
        enabled: true,
        debounce_ms: 120,
        ..WatchConfig::default()
    };
    engine.set_watch_config(config.clone()).await.unwrap();
    assert!(!engine.watch_status().await.active);

    let reopened = Engine::open(&project.store, "proj").unwrap();
    assert_eq!(reopened.watch_config().unwrap(), config);
}
