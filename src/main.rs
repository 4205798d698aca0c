//! filescope - a dependency-aware model of a codebase.
//!
//! Usage:
//!   filescope scan [PATH]          Scan a project and save its tree
//!   filescope important            Rank files by importance
//!   filescope show FILE            Show one file's dependencies
//!   filescope summary FILE [TEXT]  Set or clear a file's summary
//!   filescope exclude PATTERN      Drop matching files and skip them from now on
//!   filescope watch                Keep the tree in sync with the disk
//!   filescope list                 List saved trees
//!   filescope --help               Show help

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tracing_subscriber::EnvFilter;

use filescope_core::path::is_within;
use filescope_core::{DEFAULT_MAX_FILE_SIZE, FileNode, UnresolvedReason};
use filescope_ops::{Engine, EngineOptions, NodeUpdate, TreeEvent};

/// Name of the default store directory inside the project.
const STORE_DIR: &str = ".filescope";

/// Version control metadata, never part of a tree built from the CLI.
const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn"];

#[derive(Parser)]
#[command(
    name = "filescope",
    version,
    about = "Dependency-aware codebase model with importance scoring",
    long_about = "filescope scans a project, extracts import relationships between its files, \
                  scores each file by how central it is, and keeps the result in sync with the \
                  disk while watching."
)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short = 'C', long, global = true, default_value = ".")]
    project: PathBuf,

    /// Directory holding saved trees (defaults to PROJECT/.filescope)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Saved tree name (defaults to the project directory's name)
    #[arg(long, global = true)]
    name: Option<String>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the project and save a fresh tree
    Scan {
        /// Glob patterns to exclude
        #[arg(short, long = "exclude")]
        excludes: Vec<String>,

        /// Root for root-relative imports
        #[arg(long)]
        project_root: Option<PathBuf>,

        /// Leave out dot-prefixed files and directories
        #[arg(long)]
        skip_hidden: bool,

        /// Maximum directory depth to scan
        #[arg(short = 'd', long)]
        max_depth: Option<u32>,

        /// Worker threads (0 = auto)
        #[arg(short = 'j', long, default_value = "0")]
        threads: usize,

        /// Skip extraction for files larger than this (e.g. "512KB", "2MB")
        #[arg(long)]
        max_file_size: Option<String>,

        /// Number of top files to show
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,
    },

    /// Rank files by importance
    Important {
        /// Number of files to show
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,

        /// Minimum importance
        #[arg(short, long, default_value = "0")]
        min: f64,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a file with its dependencies and dependents
    Show {
        /// File to show
        file: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Set or clear the summary of a file
    Summary {
        /// File to annotate
        file: PathBuf,

        /// Summary text (omit to clear)
        text: Option<String>,
    },

    /// Add a file or directory to the tree
    Add {
        /// Path to add
        path: PathBuf,
    },

    /// Remove a file or directory from the tree
    Remove {
        /// Path to remove
        path: PathBuf,
    },

    /// Remove everything matching a glob and exclude it from future scans
    Exclude {
        /// Glob pattern (e.g. "*.test.ts", "build/**")
        pattern: String,
    },

    /// Watch the project and keep the tree up to date until interrupted
    Watch {
        /// Quiet period before a changed file is processed
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// List saved trees
    List,

    /// Delete a saved tree
    Delete {
        /// Tree name
        tree: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Where trees are stored and which one is meant.
struct Target {
    project: PathBuf,
    store: PathBuf,
    name: Option<String>,
}

impl Target {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let project = cli
            .project
            .canonicalize()
            .with_context(|| format!("Invalid project path {}", cli.project.display()))?;
        let store = match &cli.store {
            Some(dir) if dir.is_relative() => std::env::current_dir()?.join(dir),
            Some(dir) => dir.clone(),
            None => project.join(STORE_DIR),
        };
        Ok(Self {
            project,
            store,
            name: cli.name.clone(),
        })
    }

    fn options(&self) -> EngineOptions {
        let mut options = EngineOptions {
            filename: self.name.clone(),
            exclude_patterns: VCS_DIRS.iter().map(|d| d.to_string()).collect(),
            ..EngineOptions::default()
        };
        if is_within(&self.store, &self.project) {
            if let Some(dir) = self.store.file_name() {
                options
                    .exclude_patterns
                    .push(dir.to_string_lossy().into_owned());
            }
        }
        options
    }

    async fn open(&self) -> Result<Engine> {
        let project = self.project.clone();
        let store = self.store.clone();
        let options = self.options();
        tokio::task::spawn_blocking(move || Engine::open_or_create(project, store, options))
            .await?
            .context("Failed to open tree")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let target = Target::from_cli(&cli)?;

    match cli.command {
        Command::Scan {
            excludes,
            project_root,
            skip_hidden,
            max_depth,
            threads,
            max_file_size,
            top,
        } => {
            let mut options = target.options();
            options.exclude_patterns.extend(excludes);
            options.project_root = project_root;
            options.include_hidden = !skip_hidden;
            options.max_depth = max_depth;
            options.threads = threads;
            options.max_file_size = match max_file_size {
                Some(size) => parse_size(&size)?,
                None => DEFAULT_MAX_FILE_SIZE,
            };
            run_scan(&target, options, top).await?;
        }
        Command::Important { top, min, format } => {
            let engine = target.open().await?;
            let files = engine.important_files(Some(top), min)?;
            match format {
                OutputFormat::Text => print_ranking(&files, &target.project),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&files)?),
            }
        }
        Command::Show { file, format } => {
            let engine = target.open().await?;
            let path = resolve(&file)?;
            let Some(node) = engine.get_node(&path)? else {
                bail!("{} is not part of the tree", path.display());
            };
            match format {
                OutputFormat::Text => print_node(&node, &target.project),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&node)?),
            }
        }
        Command::Summary { file, text } => {
            let engine = target.open().await?;
            let path = resolve(&file)?;
            let update = NodeUpdate {
                summary: Some(text),
                ..NodeUpdate::default()
            };
            engine
                .update_node(&path, &update)
                .with_context(|| format!("Failed to update {}", path.display()))?;
            eprintln!("Updated {}", relative(&path, &target.project));
        }
        Command::Add { path } => {
            let engine = target.open().await?;
            let path = resolve(&path)?;
            let added = engine
                .add_node(&path)
                .with_context(|| format!("Failed to add {}", path.display()))?;
            eprintln!("Added {} node(s)", added.len());
        }
        Command::Remove { path } => {
            let engine = target.open().await?;
            let path = resolve(&path)?;
            let removed = engine
                .remove_node(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            eprintln!("Removed {} node(s)", removed.len());
        }
        Command::Exclude { pattern } => {
            let engine = target.open().await?;
            let removed = engine
                .exclude_and_remove(&pattern)
                .with_context(|| format!("Failed to exclude '{}'", pattern))?;
            for path in &removed {
                println!("{}", relative(path, &target.project));
            }
            eprintln!("Removed {} node(s); '{}' is now excluded", removed.len(), pattern);
        }
        Command::Watch { debounce_ms } => {
            run_watch(&target, debounce_ms).await?;
        }
        Command::List => {
            let store = filescope_ops::TreeStore::new(&target.store);
            let trees = store.list().context("Failed to list trees")?;
            if trees.is_empty() {
                println!("No saved trees in {}", target.store.display());
            }
            for tree in trees {
                println!(
                    "{:<30} {}  (updated {})",
                    tree.filename,
                    tree.base_directory.display(),
                    tree.last_updated.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Command::Delete { tree } => {
            let store = filescope_ops::TreeStore::new(&target.store);
            store
                .delete(&tree)
                .with_context(|| format!("Failed to delete tree '{}'", tree))?;
            eprintln!("Deleted {}", tree);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Scan, save and print a summary.
async fn run_scan(target: &Target, options: EngineOptions, top: usize) -> Result<()> {
    eprintln!("Scanning {}...", target.project.display());

    let project = target.project.clone();
    let store = target.store.clone();
    let engine = tokio::task::spawn_blocking(move || Engine::create(project, store, options))
        .await?
        .context("Scan failed")?;

    let stats = engine.stats()?;
    let warnings = engine.warnings()?;

    println!();
    println!("{}", "─".repeat(60));
    println!(" {}", target.project.display());
    println!(
        " {} files, {} directories, {} dependencies",
        stats.total_files, stats.total_dirs, stats.total_edges
    );
    println!(" {} unresolved references", stats.unresolved_references);
    println!(" Saved to {}", engine.document_path()?.display());
    println!("{}", "─".repeat(60));
    println!();

    print_ranking(&engine.important_files(Some(top), 0.0)?, &target.project);

    if !warnings.is_empty() {
        println!();
        println!("{} warning(s) during scan", warnings.len());
    }
    Ok(())
}

/// Watch until Ctrl-C, logging every change.
async fn run_watch(target: &Target, debounce_ms: Option<u64>) -> Result<()> {
    let engine = target.open().await?;

    let mut config = engine.watch_config()?;
    config.enabled = true;
    if let Some(ms) = debounce_ms {
        if ms == 0 {
            bail!("--debounce-ms must be greater than zero");
        }
        config.debounce_ms = ms;
    }
    engine.set_watch_config(config).await?;

    let mut events = engine.subscribe();
    engine
        .start_watching()
        .await
        .context("Failed to start watching")?;
    let status = engine.watch_status().await;
    eprintln!(
        "Watching {} ({} directories). Press Ctrl-C to stop.",
        target.project.display(),
        status.watched_directories
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(TreeEvent::NodeAdded(path)) => println!("+ {}", relative(&path, &target.project)),
                Ok(TreeEvent::NodeRemoved(path)) => println!("- {}", relative(&path, &target.project)),
                Ok(TreeEvent::NodeUpdated(path)) => println!("~ {}", relative(&path, &target.project)),
                Ok(TreeEvent::Rebuilt) => println!("* tree rebuilt"),
                Ok(TreeEvent::WatchLimitReached { limit }) => {
                    eprintln!("Watch limit of {} directories reached", limit);
                }
                Ok(TreeEvent::Recalculated) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event listener lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    eprintln!("Stopping...");
    engine.shutdown().await.context("Failed to save tree")?;
    Ok(())
}

fn resolve(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        path.canonicalize()
            .with_context(|| format!("Invalid path {}", path.display()))
    } else {
        // Gone from disk but possibly still in the tree.
        Ok(std::env::current_dir()?.join(path))
    }
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn print_ranking(files: &[FileNode], root: &Path) {
    if files.is_empty() {
        println!(" No files found.");
        return;
    }
    for (i, file) in files.iter().enumerate() {
        println!(
            " {:>3}. {:>5.2} {} {:<50} {:>3} in / {:>3} out",
            i + 1,
            file.importance,
            make_bar(file.importance / 10.0, 10),
            truncate(&relative(&file.path, root), 50),
            file.dependents.len(),
            file.dependencies.len()
        );
    }
}

fn print_node(node: &FileNode, root: &Path) {
    let size = std::fs::metadata(&node.path).map(|m| m.len()).ok();

    println!("{}", "─".repeat(60));
    println!(" {}", relative(&node.path, root));
    println!("{}", "─".repeat(60));
    if node.is_dir() {
        println!(" Directory with {} files", node.file_count());
        return;
    }
    println!(
        " Size:       {}",
        size.map(format_size).unwrap_or_else(|| "missing".to_string())
    );
    println!(" Importance: {:.2} {}", node.importance, make_bar(node.importance / 10.0, 20));
    if let Some(modified) = node.last_modified {
        println!(" Modified:   {}", modified.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(summary) = &node.summary {
        println!(" Summary:    {}", summary);
    }

    println!();
    println!(" Dependencies ({}):", node.dependencies.len());
    for dep in &node.dependencies {
        println!("   → {}", relative(dep, root));
    }
    println!(" Dependents ({}):", node.dependents.len());
    for dep in &node.dependents {
        println!("   ← {}", relative(dep, root));
    }
    if !node.unresolved.is_empty() {
        println!(" Unresolved ({}):", node.unresolved.len());
        for reference in &node.unresolved {
            let reason = match reference.reason {
                UnresolvedReason::External => "external",
                UnresolvedReason::OutsideRoot => "outside root",
                UnresolvedReason::Missing => "missing",
            };
            println!(
                "   {}:{} {} ({})",
                node.name, reference.line, reference.specifier, reason
            );
        }
    }
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio.clamp(0.0, 1.0)) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{}…", head)
    }
}

/// Parse a size string (e.g., "1KB", "10MB", "1GB").
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    let digits = s.trim_end_matches(|c: char| !c.is_ascii_digit() && c != '.');
    let unit = &s[digits.len()..];

    let multiplier: u64 = match unit {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        other => bail!("Unknown size unit '{}'", other),
    };
    let num: f64 = digits
        .parse()
        .with_context(|| format!("Invalid size '{}'", s))?;
    Ok((num * multiplier as f64) as u64)
}
