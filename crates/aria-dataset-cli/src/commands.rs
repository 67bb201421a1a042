use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "aria-dataset")]
#[command(
    about = "Build a deduplicated MIDI dataset and publish it to the Hugging Face Hub",
    long_about = None
)]
pub struct Cli {
    /// Directory holding the MIDI files and metadata.json
    pub base_directory: PathBuf,
    /// Stop after this many rows
    #[arg(long)]
    pub limit: Option<usize>,
    /// Save the dataset locally without uploading it
    #[arg(long)]
    pub no_push: bool,
    /// Directory the <name>_dataset folder is written into
    #[arg(long)]
    pub output_dir: Option<String>,
}

/// The dataset is named after the base directory. Paths without a final
/// name component (`/`, `.`, `..`) have none.
pub fn dataset_name(base_directory: &Path) -> Option<String> {
    base_directory
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}
