use super::{Cell, Table};
use crate::metadata::{JoinedRow, SchemaKeySet};
use crate::progress::PipelineReporter;

/// Lays a joined row out against the fixed schema. Keys the row lacks, and
/// JSON nulls, become `None`; keys outside the schema are dropped.
pub fn unify_row(schema: &SchemaKeySet, mut row: JoinedRow) -> Vec<Option<Cell>> {
    schema
        .iter()
        .map(|key| row.take(key).filter(|cell| !cell.is_null()))
        .collect()
}

pub struct TableBuilder {
    schema: SchemaKeySet,
    limit: Option<usize>,
}

impl TableBuilder {
    pub fn new(schema: SchemaKeySet) -> Self {
        Self {
            schema,
            limit: None,
        }
    }

    /// Stop pulling rows once the table holds `limit` rows.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn build<I>(&self, rows: I, reporter: &dyn PipelineReporter) -> Table
    where
        I: IntoIterator<Item = JoinedRow>,
    {
        let mut table = Table::new(&self.schema);

        if let Some(0) = self.limit {
            reporter.on_limit_reached(0);
            return table;
        }

        for row in rows {
            table.push_row(unify_row(&self.schema, row));
            reporter.on_row(table.num_rows());

            if let Some(limit) = self.limit {
                if table.num_rows() >= limit {
                    reporter.on_limit_reached(limit);
                    break;
                }
            }
        }

        table
    }
}
