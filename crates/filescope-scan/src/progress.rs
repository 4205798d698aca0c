//! Scan progress reporting.

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Stage of a running scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanPhase {
    /// Walking the directory tree.
    #[default]
    Walking,
    /// Extracting dependencies from the collected files.
    Extracting,
    /// Scan complete.
    Done,
}

/// Progress information during a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    /// Current stage.
    pub phase: ScanPhase,
    /// Number of files found so far.
    pub files_scanned: u64,
    /// Number of directories found so far.
    pub dirs_scanned: u64,
    /// Number of files whose dependencies were extracted.
    pub files_extracted: u64,
    /// Last path seen.
    pub current_path: PathBuf,
    /// Number of warnings encountered.
    pub errors_count: u64,
    /// Time elapsed since scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Get total items scanned (files + dirs).
    pub fn total_items(&self) -> u64 {
        self.files_scanned + self.dirs_scanned
    }
}

/// Running counters behind the published snapshots.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    phase: ScanPhase,
    files_scanned: u64,
    dirs_scanned: u64,
    files_extracted: u64,
    errors_count: u64,
    current_path: PathBuf,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase: ScanPhase::Walking,
            files_scanned: 0,
            dirs_scanned: 0,
            files_extracted: 0,
            errors_count: 0,
            current_path: PathBuf::new(),
        }
    }

    pub fn record_file(&mut self, path: &std::path::Path) {
        self.files_scanned += 1;
        self.current_path = path.to_path_buf();
    }

    pub fn record_dir(&mut self) {
        self.dirs_scanned += 1;
    }

    pub fn set_errors(&mut self, count: usize) {
        self.errors_count = count as u64;
    }

    pub fn record_extracted(&mut self, count: usize) {
        self.files_extracted += count as u64;
    }

    pub fn set_phase(&mut self, phase: ScanPhase) {
        self.phase = phase;
    }

    pub fn files_scanned(&self) -> u64 {
        self.files_scanned
    }

    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            phase: self.phase,
            files_scanned: self.files_scanned,
            dirs_scanned: self.dirs_scanned,
            files_extracted: self.files_extracted,
            current_path: self.current_path.clone(),
            errors_count: self.errors_count,
            elapsed: self.start_time.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_tracker_snapshot() {
        let mut tracker = ProgressTracker::new();
        tracker.record_dir();
        tracker.record_file(Path::new("/p/a.ts"));
        tracker.record_file(Path::new("/p/b.ts"));
        tracker.set_errors(1);
        tracker.set_phase(ScanPhase::Extracting);
        tracker.record_extracted(2);

        let progress = tracker.snapshot();
        assert_eq!(progress.phase, ScanPhase::Extracting);
        assert_eq!(progress.total_items(), 3);
        assert_eq!(progress.files_extracted, 2);
        assert_eq!(progress.errors_count, 1);
        assert_eq!(progress.current_path, PathBuf::from("/p/b.ts"));
    }
}
