pub mod config;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod hub;
pub mod metadata;
pub mod progress;
pub mod scanner;
pub mod table;

pub use config::AppConfig;
pub use engine::{BuildResult, DatasetEngine};
pub use error::Error;
pub use hub::{DatasetRegistry, HubClient};
pub use progress::{PipelineReporter, RunTally, SilentReporter, TracingReporter};
