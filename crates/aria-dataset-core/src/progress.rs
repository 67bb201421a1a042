use crate::hasher::ContentFingerprint;
use std::cell::Cell;
use std::fmt;
use std::io;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Per-run event sink handed to every pipeline stage.
///
/// Stages never log through a global; they report here and the implementation
/// decides what becomes a log line, a progress tick or a counter.
/// All methods have default no-op implementations.
pub trait PipelineReporter {
    fn on_run_start(&self, _root: &Path) {}
    fn on_file_discovered(&self, _path: &Path, _files_found: usize) {}
    fn on_walk_error(&self, _error: &walkdir::Error) {}
    fn on_hash_failed(&self, _path: &Path, _error: &io::Error) {}
    fn on_duplicate(&self, _path: &Path, _fingerprint: &ContentFingerprint) {}
    fn on_key_missing(&self, _path: &Path) {}
    fn on_metadata_missing(&self, _path: &Path, _key: &str) {}
    fn on_read_failed(&self, _path: &Path, _error: &io::Error) {}
    fn on_merge_failed(&self, _path: &Path, _reason: &dyn fmt::Display) {}
    fn on_row(&self, _rows: usize) {}
    fn on_limit_reached(&self, _limit: usize) {}
    fn on_run_complete(&self, _rows: usize, _duration_secs: f64) {}
}

/// No-op reporter for silent operation.
pub struct SilentReporter;

impl PipelineReporter for SilentReporter {}

/// Turns pipeline events into `tracing` events.
pub struct TracingReporter;

impl PipelineReporter for TracingReporter {
    fn on_run_start(&self, root: &Path) {
        info!("Starting dataset generation from {}", root.display());
    }

    fn on_walk_error(&self, err: &walkdir::Error) {
        error!("Error walking directory: {}", err);
    }

    fn on_hash_failed(&self, path: &Path, err: &io::Error) {
        error!("Error reading file {}: {}", path.display(), err);
    }

    fn on_duplicate(&self, path: &Path, fingerprint: &ContentFingerprint) {
        debug!("Skipping duplicate {} ({})", path.display(), fingerprint);
    }

    fn on_key_missing(&self, path: &Path) {
        warn!(
            "Could not extract key from filename {}. Skipping.",
            path.display()
        );
    }

    fn on_metadata_missing(&self, path: &Path, key: &str) {
        warn!("Metadata for file {} ({}) not found.", path.display(), key);
    }

    fn on_read_failed(&self, path: &Path, err: &io::Error) {
        error!("Error reading MIDI file {}: {}", path.display(), err);
    }

    fn on_merge_failed(&self, path: &Path, reason: &dyn fmt::Display) {
        error!(
            "Error processing metadata for file {}: {}",
            path.display(),
            reason
        );
    }

    fn on_limit_reached(&self, limit: usize) {
        info!("Row limit of {} reached, stopping early", limit);
    }

    fn on_run_complete(&self, rows: usize, duration_secs: f64) {
        info!(
            "Dataset created with {} entries in {:.2}s.",
            rows, duration_secs
        );
    }
}

/// Counts of what happened to every discovered file during one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunTally {
    pub files_discovered: usize,
    pub walk_errors: usize,
    pub unreadable: usize,
    pub duplicates: usize,
    pub missing_keys: usize,
    pub unmatched_keys: usize,
    pub read_failures: usize,
    pub merge_failures: usize,
    pub rows: usize,
}

/// Wraps another reporter, counting events before forwarding them.
pub struct TallyReporter<'a> {
    inner: &'a dyn PipelineReporter,
    files_discovered: Cell<usize>,
    walk_errors: Cell<usize>,
    unreadable: Cell<usize>,
    duplicates: Cell<usize>,
    missing_keys: Cell<usize>,
    unmatched_keys: Cell<usize>,
    read_failures: Cell<usize>,
    merge_failures: Cell<usize>,
    rows: Cell<usize>,
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

impl<'a> TallyReporter<'a> {
    pub fn new(inner: &'a dyn PipelineReporter) -> Self {
        Self {
            inner,
            files_discovered: Cell::new(0),
            walk_errors: Cell::new(0),
            unreadable: Cell::new(0),
            duplicates: Cell::new(0),
            missing_keys: Cell::new(0),
            unmatched_keys: Cell::new(0),
            read_failures: Cell::new(0),
            merge_failures: Cell::new(0),
            rows: Cell::new(0),
        }
    }

    pub fn tally(&self) -> RunTally {
        RunTally {
            files_discovered: self.files_discovered.get(),
            walk_errors: self.walk_errors.get(),
            unreadable: self.unreadable.get(),
            duplicates: self.duplicates.get(),
            missing_keys: self.missing_keys.get(),
            unmatched_keys: self.unmatched_keys.get(),
            read_failures: self.read_failures.get(),
            merge_failures: self.merge_failures.get(),
            rows: self.rows.get(),
        }
    }
}

impl PipelineReporter for TallyReporter<'_> {
    fn on_run_start(&self, root: &Path) {
        self.inner.on_run_start(root);
    }

    fn on_file_discovered(&self, path: &Path, files_found: usize) {
        bump(&self.files_discovered);
        self.inner.on_file_discovered(path, files_found);
    }

    fn on_walk_error(&self, err: &walkdir::Error) {
        bump(&self.walk_errors);
        self.inner.on_walk_error(err);
    }

    fn on_hash_failed(&self, path: &Path, err: &io::Error) {
        bump(&self.unreadable);
        self.inner.on_hash_failed(path, err);
    }

    fn on_duplicate(&self, path: &Path, fingerprint: &ContentFingerprint) {
        bump(&self.duplicates);
        self.inner.on_duplicate(path, fingerprint);
    }

    fn on_key_missing(&self, path: &Path) {
        bump(&self.missing_keys);
        self.inner.on_key_missing(path);
    }

    fn on_metadata_missing(&self, path: &Path, key: &str) {
        bump(&self.unmatched_keys);
        self.inner.on_metadata_missing(path, key);
    }

    fn on_read_failed(&self, path: &Path, err: &io::Error) {
        bump(&self.read_failures);
        self.inner.on_read_failed(path, err);
    }

    fn on_merge_failed(&self, path: &Path, reason: &dyn fmt::Display) {
        bump(&self.merge_failures);
        self.inner.on_merge_failed(path, reason);
    }

    fn on_row(&self, rows: usize) {
        self.rows.set(rows);
        self.inner.on_row(rows);
    }

    fn on_limit_reached(&self, limit: usize) {
        self.inner.on_limit_reached(limit);
    }

    fn on_run_complete(&self, rows: usize, duration_secs: f64) {
        self.inner.on_run_complete(rows, duration_secs);
    }
}
