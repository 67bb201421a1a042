use crate::hasher::{self, ContentFingerprint};
use crate::progress::PipelineReporter;
use ahash::AHashSet;
use std::path::PathBuf;

/// Forwards only the first path seen for each content fingerprint.
///
/// The seen set lives as long as the adapter, i.e. one run. Files that cannot
/// be fingerprinted are reported and dropped.
pub struct Deduplicate<'r, I> {
    files: I,
    seen: AHashSet<ContentFingerprint>,
    reporter: &'r dyn PipelineReporter,
}

impl<'r, I> Deduplicate<'r, I>
where
    I: Iterator<Item = PathBuf>,
{
    pub fn new(files: I, reporter: &'r dyn PipelineReporter) -> Self {
        Self {
            files,
            seen: AHashSet::new(),
            reporter,
        }
    }
}

impl<I> Iterator for Deduplicate<'_, I>
where
    I: Iterator<Item = PathBuf>,
{
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        for file in self.files.by_ref() {
            let fingerprint = match hasher::fingerprint_file(&file) {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    self.reporter.on_hash_failed(&file, &e);
                    continue;
                }
            };

            if self.seen.insert(fingerprint) {
                return Some(file);
            }
            self.reporter.on_duplicate(&file, &fingerprint);
        }
        None
    }
}

pub trait UniqueFiles: Iterator<Item = PathBuf> + Sized {
    fn unique_files(self, reporter: &dyn PipelineReporter) -> Deduplicate<'_, Self> {
        Deduplicate::new(self, reporter)
    }
}

impl<I: Iterator<Item = PathBuf>> UniqueFiles for I {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{SilentReporter, TallyReporter};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_first_occurrence_wins() {
        let tmp = tempdir().unwrap();
        let first = write(tmp.path(), "001_a.mid", b"same bytes");
        let second = write(tmp.path(), "002_b.mid", b"same bytes");
        let other = write(tmp.path(), "003_c.mid", b"other bytes");

        let unique: Vec<PathBuf> = vec![first.clone(), second, other.clone()]
            .into_iter()
            .unique_files(&SilentReporter)
            .collect();
        assert_eq!(unique, vec![first, other]);
    }

    #[test]
    fn test_distinct_content_all_kept() {
        let tmp = tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..5)
            .map(|i| write(tmp.path(), &format!("{i:03}_x.mid"), format!("song {i}").as_bytes()))
            .collect();

        let unique: Vec<PathBuf> = paths.clone().into_iter().unique_files(&SilentReporter).collect();
        assert_eq!(unique, paths);
    }

    #[test]
    fn test_unreadable_and_duplicates_reported() {
        let tmp = tempdir().unwrap();
        let a = write(tmp.path(), "001_a.mid", b"content");
        let b = write(tmp.path(), "002_b.mid", b"content");
        let missing = tmp.path().join("003_gone.mid");

        let tally = TallyReporter::new(&SilentReporter);
        let unique: Vec<PathBuf> = vec![missing, a.clone(), b]
            .into_iter()
            .unique_files(&tally)
            .collect();

        assert_eq!(unique, vec![a]);
        let counts = tally.tally();
        assert_eq!(counts.unreadable, 1);
        assert_eq!(counts.duplicates, 1);
    }

    #[test]
    fn test_dedupe_is_lazy() {
        let tmp = tempdir().unwrap();
        let a = write(tmp.path(), "001_a.mid", b"a");
        let b = write(tmp.path(), "002_b.mid", b"b");

        let mut pulled = 0usize;
        let source = vec![a.clone(), b].into_iter().inspect(|_| pulled += 1);
        let first = Deduplicate::new(source, &SilentReporter).next();
        assert_eq!(first, Some(a));
        assert_eq!(pulled, 1);
    }
}
