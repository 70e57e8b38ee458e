//! In-memory tables backed by a row-producing function

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

use super::{HeaderVariables, RangeSpec, Table, distinct_values, range_of, select_rows};
use crate::convert::{coerce_rows, jsonifiable_rows};
use crate::error::Result;
use crate::filter::FilterSpec;
use crate::types::{Row, Schema, Value};

/// Zero-argument function producing a table's rows. Called on every
/// operation, so it must be side-effect free.
pub type RowProducer = Arc<dyn Fn() -> Vec<Row> + Send + Sync>;

#[derive(Clone)]
pub struct DataPlaneTable {
    schema: Schema,
    producer: RowProducer,
    header_variables: HeaderVariables,
}

impl DataPlaneTable {
    pub fn new<F>(schema: Schema, producer: F) -> Self
    where
        F: Fn() -> Vec<Row> + Send + Sync + 'static,
    {
        Self {
            schema,
            producer: Arc::new(producer),
            header_variables: HeaderVariables::default(),
        }
    }

    /// Table over a fixed set of rows
    pub fn from_rows(schema: Schema, rows: Vec<Row>) -> Self {
        let rows = Arc::new(rows);
        Self::new(schema, move || rows.as_ref().clone())
    }

    /// Validate a JSON schema and a list of JSON rows, coercing every cell to
    /// its column type
    pub fn from_json_rows(schema: &JsonValue, rows: &[JsonValue]) -> Result<Self> {
        let schema = Schema::from_json(schema)?;
        let rows = coerce_rows(&schema.types(), rows)?;
        Ok(Self::from_rows(schema, rows))
    }

    pub fn with_header_variables(mut self, header_variables: HeaderVariables) -> Self {
        self.header_variables = header_variables;
        self
    }

    pub fn rows(&self) -> Vec<Row> {
        (self.producer)()
    }
}

impl fmt::Debug for DataPlaneTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPlaneTable")
            .field("schema", &self.schema)
            .field("header_variables", &self.header_variables)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Table for DataPlaneTable {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn header_variables(&self) -> &HeaderVariables {
        &self.header_variables
    }

    async fn all_values(&self, column: &str) -> Result<Vec<Value>> {
        distinct_values(&self.schema, &self.rows(), column)
    }

    async fn range_spec(&self, column: &str) -> Result<RangeSpec> {
        range_of(column, distinct_values(&self.schema, &self.rows(), column)?)
    }

    async fn get_filtered_rows(
        &self,
        filter: Option<&FilterSpec>,
        columns: &[String],
    ) -> Result<Vec<Row>> {
        let rows = select_rows(&self.schema, self.rows(), filter, columns)?;
        tracing::trace!(rows = rows.len(), "Filtered in-memory table");
        Ok(rows)
    }

    fn to_json(&self) -> JsonValue {
        let mut body = json!({
            "schema": self.schema.to_json(),
            "rows": jsonifiable_rows(&self.rows()),
        });
        if !self.header_variables.is_empty() {
            body["header_variables"] = json!(self.header_variables);
        }
        body
    }
}
