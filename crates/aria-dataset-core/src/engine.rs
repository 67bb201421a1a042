use crate::config::AppConfig;
use crate::dedupe::UniqueFiles;
use crate::error::Error;
use crate::metadata::{JoinMetadata, MetadataIndex, SchemaKeySet};
use crate::progress::{PipelineReporter, RunTally, TallyReporter};
use crate::scanner;
use crate::table::{Table, TableBuilder};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub struct DatasetEngine {
    config: AppConfig,
}

#[derive(Debug)]
pub struct BuildResult {
    pub table: Table,
    pub schema: SchemaKeySet,
    pub tally: RunTally,
    pub metadata_records: usize,
    pub load_duration: Duration,
    pub pipeline_duration: Duration,
}

impl DatasetEngine {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.config.max_rows = limit;
        self
    }

    /// Run the dataset pipeline over `base_dir`:
    /// 1. Load `metadata.json` and fix the column set
    /// 2. Walk for MIDI files, drop content duplicates, join each file with its record
    /// 3. Lay every joined row out against the fixed columns
    ///
    /// Everything is pulled one file at a time on the calling thread.
    pub fn build(
        &self,
        base_dir: &Path,
        reporter: &dyn PipelineReporter,
    ) -> Result<BuildResult, Error> {
        scanner::ensure_root(base_dir)?;

        // Phase 1: Metadata
        let metadata_path = base_dir.join(&self.config.metadata_file);
        info!("Loading {}...", self.config.metadata_file);
        let load_start = Instant::now();
        let index = MetadataIndex::load(&metadata_path)?;
        let schema = SchemaKeySet::from_index(&index);
        let load_duration = load_start.elapsed();
        debug!(
            "Metadata loaded in {:.2}s: {} records, {} columns",
            load_duration.as_secs_f64(),
            index.len(),
            schema.len(),
        );

        // Phase 2 + 3: Discover -> Deduplicate -> Join -> Table
        info!("Starting dataset generation...");
        let tally = TallyReporter::new(reporter);
        tally.on_run_start(base_dir);
        let pipeline_start = Instant::now();

        let rows = scanner::discover_files(
            base_dir,
            &self.config.extensions,
            &self.config.ignore_patterns,
            &tally,
        )?
        .unique_files(&tally)
        .join_metadata(&index, &tally);
        let table = TableBuilder::new(schema.clone())
            .with_limit(self.config.max_rows)
            .build(rows, &tally);

        let pipeline_duration = pipeline_start.elapsed();
        tally.on_run_complete(table.num_rows(), pipeline_duration.as_secs_f64());

        Ok(BuildResult {
            table,
            schema,
            tally: tally.tally(),
            metadata_records: index.len(),
            load_duration,
            pipeline_duration,
        })
    }
}
