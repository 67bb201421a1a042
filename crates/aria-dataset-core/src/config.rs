use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// File name suffixes accepted by discovery, matched case-sensitively.
    pub extensions: Vec<String>,
    pub ignore_patterns: Vec<String>,
    /// Name of the metadata file expected at the root of the base directory.
    pub metadata_file: String,
    /// Parent directory of the `<name>_dataset` output directory.
    pub output_dir: String,
    pub max_rows: Option<usize>,
    pub hub_endpoint: String,
    pub private: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            extensions: vec![".mid".to_string(), ".midi".to_string()],
            ignore_patterns: Vec::new(),
            metadata_file: "metadata.json".to_string(),
            output_dir: ".".to_string(),
            max_rows: None,
            hub_endpoint: DEFAULT_HUB_ENDPOINT.to_string(),
            private: false,
        }
    }
}

/// Defaults, then an optional `Config.toml`, then `ARIA_DATASET_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("ARIA_DATASET")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("extensions")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
