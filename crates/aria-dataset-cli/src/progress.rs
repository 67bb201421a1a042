use aria_dataset_core::hasher::ContentFingerprint;
use aria_dataset_core::{PipelineReporter, TracingReporter};
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;
use std::path::Path;

/// CLI reporter: one spinner for the whole pull pipeline, with per-file
/// problems logged through tracing above it.
pub struct CliReporter {
    bar: RefCell<Option<ProgressBar>>,
    files_found: Cell<usize>,
    rows: Cell<usize>,
    log: TracingReporter,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: RefCell::new(None),
            files_found: Cell::new(0),
            rows: Cell::new(0),
            log: TracingReporter,
        }
    }

    fn refresh(&self) {
        if let Some(pb) = self.bar.borrow().as_ref() {
            pb.set_message(format!(
                "Building dataset... {} files found, {} rows",
                self.files_found.get(),
                self.rows.get()
            ));
        }
    }

    /// Runs `f` with the spinner hidden so log lines do not tear it.
    fn above_bar(&self, f: impl FnOnce()) {
        match self.bar.borrow().as_ref() {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.bar.borrow_mut().take() {
            pb.finish_and_clear();
        }
    }
}

impl PipelineReporter for CliReporter {
    fn on_run_start(&self, root: &Path) {
        self.log.on_run_start(root);
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        *self.bar.borrow_mut() = Some(pb);
        self.refresh();
    }

    fn on_file_discovered(&self, _path: &Path, files_found: usize) {
        self.files_found.set(files_found);
        self.refresh();
    }

    fn on_walk_error(&self, err: &walkdir::Error) {
        self.above_bar(|| self.log.on_walk_error(err));
    }

    fn on_hash_failed(&self, path: &Path, err: &io::Error) {
        self.above_bar(|| self.log.on_hash_failed(path, err));
    }

    fn on_duplicate(&self, path: &Path, fingerprint: &ContentFingerprint) {
        self.log.on_duplicate(path, fingerprint);
    }

    fn on_key_missing(&self, path: &Path) {
        self.above_bar(|| self.log.on_key_missing(path));
    }

    fn on_metadata_missing(&self, path: &Path, key: &str) {
        self.above_bar(|| self.log.on_metadata_missing(path, key));
    }

    fn on_read_failed(&self, path: &Path, err: &io::Error) {
        self.above_bar(|| self.log.on_read_failed(path, err));
    }

    fn on_merge_failed(&self, path: &Path, reason: &dyn fmt::Display) {
        self.above_bar(|| self.log.on_merge_failed(path, reason));
    }

    fn on_row(&self, rows: usize) {
        self.rows.set(rows);
        self.refresh();
    }

    fn on_limit_reached(&self, limit: usize) {
        self.above_bar(|| self.log.on_limit_reached(limit));
    }

    fn on_run_complete(&self, rows: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Pipeline complete: {} files seen, {} rows in {:.2}s",
            self.files_found.get(),
            rows,
            duration_secs
        );
        self.log.on_run_complete(rows, duration_secs);
    }
}
