mod builder;
pub mod persist;

pub use builder::{unify_row, TableBuilder};
pub use persist::{save_to_disk, DatasetInfo, FeatureInfo, SavedTable};

use crate::metadata::SchemaKeySet;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A single non-null table value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Json(Value::Null))
    }

    /// JSON text for columns whose values do not share one scalar type.
    pub fn to_json_text(&self) -> String {
        match self {
            Cell::Json(value) => value.to_string(),
            Cell::Text(text) => Value::String(text.clone()).to_string(),
            Cell::Binary(bytes) => Value::from(bytes.clone()).to_string(),
        }
    }

    fn kind(&self) -> Option<ColumnKind> {
        match self {
            Cell::Text(_) => Some(ColumnKind::String),
            Cell::Binary(_) => Some(ColumnKind::Binary),
            Cell::Json(Value::Null) => None,
            Cell::Json(Value::String(_)) => Some(ColumnKind::String),
            Cell::Json(Value::Bool(_)) => Some(ColumnKind::Bool),
            Cell::Json(Value::Number(n)) if n.is_i64() => Some(ColumnKind::Int64),
            Cell::Json(Value::Number(n)) if n.is_f64() => Some(ColumnKind::Float64),
            // Unsigned beyond i64::MAX would lose digits as a double.
            Cell::Json(_) => Some(ColumnKind::Json),
        }
    }
}

/// Storage type of a column, inferred from its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    String,
    Int64,
    Float64,
    Bool,
    Binary,
    Json,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::String => "string",
            ColumnKind::Int64 => "int64",
            ColumnKind::Float64 => "float64",
            ColumnKind::Bool => "bool",
            ColumnKind::Binary => "binary",
            ColumnKind::Json => "json",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<Option<Cell>>,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Option<Cell>] {
        &self.values
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Integers widen to floats when mixed; any other mix falls back to JSON
    /// text. A column with no values is a string column.
    pub fn kind(&self) -> ColumnKind {
        let mut kind: Option<ColumnKind> = None;
        for cell_kind in self.values.iter().flatten().filter_map(Cell::kind) {
            kind = Some(match (kind, cell_kind) {
                (None, k) => k,
                (Some(a), b) if a == b => a,
                (Some(ColumnKind::Int64), ColumnKind::Float64)
                | (Some(ColumnKind::Float64), ColumnKind::Int64) => ColumnKind::Float64,
                _ => return ColumnKind::Json,
            });
        }
        kind.unwrap_or(ColumnKind::String)
    }
}

/// Columnar table with one column per schema member, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    num_rows: usize,
}

impl Table {
    pub fn new(schema: &SchemaKeySet) -> Self {
        Self {
            columns: schema
                .iter()
                .map(|name| Column {
                    name: name.to_string(),
                    values: Vec::new(),
                })
                .collect(),
            num_rows: 0,
        }
    }

    /// `row` must hold one entry per column, in column order.
    pub(crate) fn push_row(&mut self, row: Vec<Option<Cell>>) {
        debug_assert_eq!(row.len(), self.columns.len());
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.values.push(value);
        }
        self.num_rows += 1;
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn row(&self, index: usize) -> Option<BTreeMap<&str, Option<&Cell>>> {
        if index >= self.num_rows {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|c| (c.name.as_str(), c.values[index].as_ref()))
                .collect(),
        )
    }
}
