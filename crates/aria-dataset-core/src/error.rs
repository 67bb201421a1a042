use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Metadata file {} not found", .0.display())]
    MetadataMissing(PathBuf),

    #[error("Invalid metadata file {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Missing registry credential: {0} is not set")]
    MissingCredential(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("{0}")]
    Other(String),
}
