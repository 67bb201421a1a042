use super::{Cell, Column, ColumnKind, Table};
use crate::error::Error;
use crate::hasher::PREFIX_HASH_LENGTH;
use chrono::{DateTime, Utc};
use parquet::basic::{Compression, LogicalType, Repetition, Type as PhysicalType};
use parquet::data_type::{BoolType, ByteArray, ByteArrayType, DoubleType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::{SerializedColumnWriter, SerializedFileWriter};
use parquet::schema::types::Type;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const DATA_FILE_NAME: &str = "data-00000-of-00001.parquet";
pub const INFO_FILE_NAME: &str = "dataset_info.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub name: String,
    pub dtype: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub dataset_name: String,
    pub num_rows: usize,
    pub features: Vec<FeatureInfo>,
    pub source_directory: String,
    pub prefix_hash_length: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SavedTable {
    pub dir: PathBuf,
    pub data_file: PathBuf,
    pub info_file: PathBuf,
    pub info: DatasetInfo,
}

/// Writes `<output_dir>/<dataset_name>_dataset/` holding the table as parquet
/// plus a `dataset_info.json` description.
pub fn save_to_disk(
    table: &Table,
    output_dir: &Path,
    dataset_name: &str,
    source_dir: &Path,
) -> Result<SavedTable, Error> {
    let dir = output_dir.join(format!("{}_dataset", dataset_name));
    fs::create_dir_all(&dir)?;

    let data_file = dir.join(DATA_FILE_NAME);
    let kinds = write_parquet(table, &data_file)?;
    debug!("Wrote {} rows to {}", table.num_rows(), data_file.display());

    let info = DatasetInfo {
        dataset_name: dataset_name.to_string(),
        num_rows: table.num_rows(),
        features: table
            .columns()
            .iter()
            .zip(&kinds)
            .map(|(column, kind)| FeatureInfo {
                name: column.name().to_string(),
                dtype: kind.to_string(),
            })
            .collect(),
        source_directory: source_dir.to_string_lossy().into_owned(),
        prefix_hash_length: PREFIX_HASH_LENGTH,
        created_at: Utc::now(),
    };

    let info_file = dir.join(INFO_FILE_NAME);
    serde_json::to_writer_pretty(File::create(&info_file)?, &info)?;

    Ok(SavedTable {
        dir,
        data_file,
        info_file,
        info,
    })
}

fn parquet_field(name: &str, kind: ColumnKind) -> parquet::errors::Result<Type> {
    let (physical, logical) = match kind {
        ColumnKind::String => (PhysicalType::BYTE_ARRAY, Some(LogicalType::String)),
        ColumnKind::Json => (PhysicalType::BYTE_ARRAY, Some(LogicalType::Json)),
        ColumnKind::Binary => (PhysicalType::BYTE_ARRAY, None),
        ColumnKind::Int64 => (PhysicalType::INT64, None),
        ColumnKind::Float64 => (PhysicalType::DOUBLE, None),
        ColumnKind::Bool => (PhysicalType::BOOLEAN, None),
    };
    Type::primitive_type_builder(name, physical)
        .with_repetition(Repetition::OPTIONAL)
        .with_logical_type(logical)
        .build()
}

fn write_parquet(table: &Table, path: &Path) -> Result<Vec<ColumnKind>, Error> {
    let kinds: Vec<ColumnKind> = table.columns().iter().map(Column::kind).collect();

    let fields = table
        .columns()
        .iter()
        .zip(&kinds)
        .map(|(column, kind)| parquet_field(column.name(), *kind).map(Arc::new))
        .collect::<parquet::errors::Result<Vec<_>>>()?;
    let schema = Arc::new(Type::group_type_builder("schema").with_fields(fields).build()?);
    let props = Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build(),
    );

    let mut writer = SerializedFileWriter::new(File::create(path)?, schema, props)?;

    if table.num_rows() > 0 {
        let mut row_group = writer.next_row_group()?;
        for (column, kind) in table.columns().iter().zip(&kinds) {
            let Some(mut col_writer) = row_group.next_column()? else {
                return Err(Error::Other(format!(
                    "parquet schema has no slot for column '{}'",
                    column.name()
                )));
            };
            write_column(&mut col_writer, column, *kind)?;
            col_writer.close()?;
        }
        row_group.close()?;
    }

    writer.close()?;
    Ok(kinds)
}

/// Definition level 1 marks a present value, 0 a null.
fn levels<T>(column: &Column, convert: impl Fn(&Cell) -> Option<T>) -> (Vec<T>, Vec<i16>) {
    let mut values = Vec::new();
    let mut def_levels = Vec::with_capacity(column.values().len());
    for cell in column.values() {
        match cell.as_ref().and_then(&convert) {
            Some(value) => {
                values.push(value);
                def_levels.push(1);
            }
            None => def_levels.push(0),
        }
    }
    (values, def_levels)
}

fn write_column(
    col_writer: &mut SerializedColumnWriter<'_>,
    column: &Column,
    kind: ColumnKind,
) -> Result<(), Error> {
    match kind {
        ColumnKind::String => {
            let (values, defs) = levels(column, |cell| match cell {
                Cell::Text(text) => Some(ByteArray::from(text.as_str())),
                Cell::Json(Value::String(text)) => Some(ByteArray::from(text.as_str())),
                _ => None,
            });
            col_writer
                .typed::<ByteArrayType>()
                .write_batch(&values, Some(defs.as_slice()), None)?;
        }
        ColumnKind::Json => {
            let (values, defs) = levels(column, |cell| {
                Some(ByteArray::from(cell.to_json_text().into_bytes()))
            });
            col_writer
                .typed::<ByteArrayType>()
                .write_batch(&values, Some(defs.as_slice()), None)?;
        }
        ColumnKind::Binary => {
            let (values, defs) = levels(column, |cell| match cell {
                Cell::Binary(bytes) => Some(ByteArray::from(bytes.clone())),
                _ => None,
            });
            col_writer
                .typed::<ByteArrayType>()
                .write_batch(&values, Some(defs.as_slice()), None)?;
        }
        ColumnKind::Int64 => {
            let (values, defs) = levels(column, |cell| match cell {
                Cell::Json(Value::Number(n)) => n.as_i64(),
                _ => None,
            });
            col_writer
                .typed::<Int64Type>()
                .write_batch(&values, Some(defs.as_slice()), None)?;
        }
        ColumnKind::Float64 => {
            let (values, defs) = levels(column, |cell| match cell {
                Cell::Json(Value::Number(n)) => n.as_f64(),
                _ => None,
            });
            col_writer
                .typed::<DoubleType>()
                .write_batch(&values, Some(defs.as_slice()), None)?;
        }
        ColumnKind::Bool => {
            let (values, defs) = levels(column, |cell| match cell {
                Cell::Json(Value::Bool(b)) => Some(*b),
                _ => None,
            });
            col_writer
                .typed::<BoolType>()
                .write_batch(&values, Some(defs.as_slice()), None)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{JoinMetadata, MetadataIndex, SchemaKeySet};
    use crate::progress::SilentReporter;
    use crate::table::TableBuilder;
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use tempfile::tempdir;

    #[test]
    fn test_save_round_trips_shape() {
        let tmp = tempdir().unwrap();
        let source = tmp.path().join("aria");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("001_a.mid"), b"first").unwrap();
        fs::write(source.join("002_b.mid"), b"second").unwrap();
        let index = MetadataIndex::parse(
            r#"{
                "1": {"metadata": {"title": "X", "year": 1720, "live": true}, "audio_scores": [0.9]},
                "2": {"metadata": {"title": "Y", "tempo": 92.5, "tags": ["a"]}, "audio_scores": [0.8]}
            }"#,
        )
        .unwrap();
        let schema = SchemaKeySet::from_index(&index);
        let rows = vec![source.join("001_a.mid"), source.join("002_b.mid")]
            .into_iter()
            .join_metadata(&index, &SilentReporter);
        let table = TableBuilder::new(schema).build(rows, &SilentReporter);

        let out = tmp.path().join("out");
        let saved = save_to_disk(&table, &out, "aria", &source).unwrap();
        assert_eq!(saved.dir, out.join("aria_dataset"));
        assert!(saved.data_file.exists());

        let reader = SerializedFileReader::new(File::open(&saved.data_file).unwrap()).unwrap();
        let meta = reader.metadata().file_metadata();
        assert_eq!(meta.num_rows(), 2);
        let names: Vec<&str> = meta
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(names, table.column_names());

        let info: DatasetInfo =
            serde_json::from_reader(File::open(&saved.info_file).unwrap()).unwrap();
        assert_eq!(info.num_rows, 2);
        assert_eq!(info.prefix_hash_length, 8192);
        let dtype = |name: &str| {
            info.features
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.dtype.clone())
                .unwrap()
        };
        assert_eq!(dtype("title"), "string");
        assert_eq!(dtype("year"), "int64");
        assert_eq!(dtype("tempo"), "float64");
        assert_eq!(dtype("live"), "bool");
        assert_eq!(dtype("tags"), "json");
        assert_eq!(dtype("file"), "binary");
        assert_eq!(dtype("audio_scores"), "string");
    }

    #[test]
    fn test_save_empty_table() {
        let tmp = tempdir().unwrap();
        let index = MetadataIndex::parse(r#"{"1": {"metadata": {"title": "X"}}}"#).unwrap();
        let table = Table::new(&SchemaKeySet::from_index(&index));

        let saved = save_to_disk(&table, tmp.path(), "empty", tmp.path()).unwrap();
        let reader = SerializedFileReader::new(File::open(&saved.data_file).unwrap()).unwrap();
        assert_eq!(reader.metadata().file_metadata().num_rows(), 0);
        assert_eq!(saved.info.num_rows, 0);
    }
}
