use crate::progress::PipelineReporter;
use glob::Pattern;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::error;
use walkdir::{DirEntry, WalkDir};

/// Fails with `NotFound` if `root` is missing and `InvalidInput` if it is not a directory.
pub fn ensure_root(root: &Path) -> io::Result<()> {
    let metadata = match fs::metadata(root) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Directory {} does not exist.", root.display()),
            ));
        }
        Err(err) => {
            return Err(io::Error::new(
                err.kind(),
                format!("Error reading directory {}: {}", root.display(), err),
            ));
        }
    };

    if !metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory.", root.display()),
        ));
    }
    Ok(())
}

/// Lazily walks `root` and yields every file whose name ends with one of
/// `extensions`. Symlinks to files are yielded; symlinked directories are not
/// descended into. Entries are visited in file-name order within a directory.
pub fn discover_files<'r>(
    root: &Path,
    extensions: &[String],
    ignore_globs: &[String],
    reporter: &'r dyn PipelineReporter,
) -> io::Result<Discovery<'r>> {
    ensure_root(root)?;

    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    Ok(Discovery {
        walker: WalkDir::new(root).sort_by_file_name().into_iter(),
        extensions: extensions.to_vec(),
        ignore_patterns,
        reporter,
        files_found: 0,
    })
}

pub struct Discovery<'r> {
    walker: walkdir::IntoIter,
    extensions: Vec<String>,
    ignore_patterns: Vec<Pattern>,
    reporter: &'r dyn PipelineReporter,
    files_found: usize,
}

impl Discovery<'_> {
    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }

    fn has_extension(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }
}

fn is_file_entry(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    if file_type.is_symlink() {
        // Dangling links resolve to an error and are skipped.
        return fs::metadata(entry.path()).map_or(false, |m| m.is_file());
    }
    file_type.is_file()
}

impl Iterator for Discovery<'_> {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    self.reporter.on_walk_error(&err);
                    continue;
                }
            };

            if entry.depth() > 0 && self.is_ignored(entry.path()) {
                if entry.file_type().is_dir() {
                    self.walker.skip_current_dir();
                }
                continue;
            }

            if !self.has_extension(entry.path()) || !is_file_entry(&entry) {
                continue;
            }

            self.files_found += 1;
            self.reporter
                .on_file_discovered(entry.path(), self.files_found);
            return Some(entry.into_path());
        }
    }
}
