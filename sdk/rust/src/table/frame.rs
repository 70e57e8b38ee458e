//! Dataframe-backed tables

use std::io;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::{DataPlaneTable, HeaderVariables, RangeSpec, Table};
use crate::convert::coerce_list;
use crate::error::{InvalidDataError, Result};
use crate::filter::FilterSpec;
use crate::types::{Row, Schema, Value};

/// Ordered, named columns of raw cells, all the same length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    columns: Vec<(String, Vec<JsonValue>)>,
    num_rows: usize,
}

impl DataFrame {
    pub fn new(columns: Vec<(String, Vec<JsonValue>)>) -> Result<Self> {
        let num_rows = columns.first().map(|(_, cells)| cells.len()).unwrap_or(0);
        if let Some((name, cells)) = columns.iter().find(|(_, cells)| cells.len() != num_rows) {
            return Err(InvalidDataError::ColumnConversion {
                column: name.clone(),
                reason: format!("has {} cells, expected {num_rows}", cells.len()),
            });
        }
        Ok(Self { columns, num_rows })
    }

    /// Read CSV text whose header row names the columns. Cells stay strings.
    pub fn from_csv<R: io::Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let csv_error = |e: csv::Error| InvalidDataError::Csv {
            reason: e.to_string(),
        };

        let names: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();
        let mut cells: Vec<Vec<JsonValue>> = vec![Vec::new(); names.len()];
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            for (column, cell) in cells.iter_mut().zip(record.iter()) {
                column.push(JsonValue::String(cell.to_string()));
            }
        }
        Self::new(names.into_iter().zip(cells).collect())
    }

    pub fn column(&self, name: &str) -> Option<&[JsonValue]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, cells)| cells.as_slice())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }
}

/// Table built from a [`DataFrame`]. Every schema column must exist in the
/// frame and every cell must coerce to its column type.
#[derive(Debug, Clone)]
pub struct DataFrameTable {
    inner: DataPlaneTable,
}

impl DataFrameTable {
    pub fn new(schema: Schema, frame: &DataFrame) -> Result<Self> {
        let mut columns = Vec::with_capacity(schema.len());
        for column in schema.columns() {
            let cells = frame
                .column(&column.name)
                .ok_or_else(|| InvalidDataError::ColumnConversion {
                    column: column.name.clone(),
                    reason: format!(
                        "not present in dataframe columns [{}]",
                        frame.column_names().join(", ")
                    ),
                })?;
            let values = coerce_list(column.column_type, cells).map_err(|e| {
                InvalidDataError::ColumnConversion {
                    column: column.name.clone(),
                    reason: e.to_string(),
                }
            })?;
            columns.push(values);
        }

        let rows: Vec<Row> = (0..frame.num_rows())
            .map(|i| columns.iter().map(|values| values[i].clone()).collect())
            .collect();
        tracing::debug!(
            columns = schema.len(),
            rows = rows.len(),
            "Built dataframe table"
        );
        Ok(Self {
            inner: DataPlaneTable::from_rows(schema, rows),
        })
    }

    pub fn with_header_variables(mut self, header_variables: HeaderVariables) -> Self {
        self.inner = self.inner.with_header_variables(header_variables);
        self
    }

    pub fn rows(&self) -> Vec<Row> {
        self.inner.rows()
    }
}

#[async_trait]
impl Table for DataFrameTable {
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn header_variables(&self) -> &HeaderVariables {
        self.inner.header_variables()
    }

    async fn all_values(&self, column: &str) -> Result<Vec<Value>> {
        self.inner.all_values(column).await
    }

    async fn range_spec(&self, column: &str) -> Result<RangeSpec> {
        self.inner.range_spec(column).await
    }

    async fn get_filtered_rows(
        &self,
        filter: Option<&FilterSpec>,
        columns: &[String],
    ) -> Result<Vec<Row>> {
        self.inner.get_filtered_rows(filter, columns).await
    }

    fn to_json(&self) -> JsonValue {
        self.inner.to_json()
    }
}
