mod join;
mod key;

pub use join::{Join, JoinMetadata, JoinedRow, MergeError};
pub use key::record_key;

use crate::error::Error;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::Path;

/// Column holding the scoring data rendered as JSON text.
pub const AUDIO_SCORES_COLUMN: &str = "audio_scores";
/// Column holding the raw bytes of the matched file.
pub const FILE_COLUMN: &str = "file";

/// One entry of `metadata.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataRecord {
    pub metadata: Map<String, Value>,
    /// `None` when the key is absent; an explicit JSON `null` is kept as `Some(Value::Null)`.
    #[serde(default, deserialize_with = "present")]
    pub audio_scores: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// `metadata.json` loaded in full, keyed by record key. Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    records: HashMap<String, MetadataRecord>,
}

impl MetadataIndex {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::MetadataMissing(path.to_path_buf()));
            }
            Err(err) => return Err(Error::Io(err)),
        };
        let records = serde_json::from_slice(&bytes).map_err(|source| Error::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { records })
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            records: serde_json::from_str(text)?,
        })
    }

    pub fn get(&self, key: &str) -> Option<&MetadataRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, &MetadataRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Every column name of the output table: the union of nested metadata keys
/// over all records, plus the two synthetic columns. Fixed before the first
/// row is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaKeySet {
    keys: BTreeSet<String>,
}

impl SchemaKeySet {
    pub fn from_index(index: &MetadataIndex) -> Self {
        let mut keys: BTreeSet<String> = index
            .records()
            .flat_map(|(_, record)| record.metadata.keys().cloned())
            .collect();
        keys.insert(AUDIO_SCORES_COLUMN.to_string());
        keys.insert(FILE_COLUMN.to_string());
        Self { keys }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
