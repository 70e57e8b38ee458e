//! Tables served by a peer data plane server

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue, json};

use super::descriptor::Connector;
use super::{HeaderVariables, NumericSpec, RangeSpec, Table, projection};
use crate::client::{ClientOptions, DataPlaneClient};
use crate::convert::{coerce, coerce_list, coerce_rows};
use crate::error::{InvalidDataError, Result};
use crate::filter::FilterSpec;
use crate::types::{DomainType, Number, Row, Schema, Value};

/// A table with no local rows. Every operation is a request to the peer
/// server, decoded with the locally declared schema.
///
/// The first operation (or an explicit [`connect`](Self::connect)) checks
/// that the peer lists the table with exactly the declared schema.
/// Concurrent first calls may both run that check; it is idempotent.
#[derive(Debug)]
pub struct RemoteDataPlaneTable {
    table_name: String,
    schema: Schema,
    client: DataPlaneClient,
    connected: AtomicBool,
    header_variables: HeaderVariables,
}

impl RemoteDataPlaneTable {
    pub fn new(table_name: impl Into<String>, url: &str, schema: Schema) -> Result<Self> {
        Self::with_options(table_name, url, schema, &ClientOptions::default())
    }

    pub fn with_options(
        table_name: impl Into<String>,
        url: &str,
        schema: Schema,
        options: &ClientOptions,
    ) -> Result<Self> {
        Ok(Self {
            table_name: table_name.into(),
            schema,
            client: DataPlaneClient::with_options(url, options)?,
            connected: AtomicBool::new(false),
            header_variables: HeaderVariables::default(),
        })
    }

    pub fn with_header_variables(mut self, header_variables: HeaderVariables) -> Self {
        self.header_variables = header_variables;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn url(&self) -> &str {
        self.client.base_url()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Ask the peer for its tables and check ours is there with our schema
    pub async fn connect(&self) -> Result<()> {
        let tables = self.client.get_tables().await?;
        let Some(remote) = tables.get(&self.table_name) else {
            return Err(InvalidDataError::TableNotListed {
                url: self.url().to_string(),
                table: self.table_name.clone(),
            });
        };
        let remote_schema =
            Schema::from_json(remote).map_err(|e| InvalidDataError::decode(self.url(), e))?;

        let mismatches = schema_mismatches(&self.schema, &remote_schema);
        if !mismatches.is_empty() {
            tracing::warn!(
                table = %self.table_name,
                url = %self.url(),
                mismatches = mismatches.len(),
                "Remote table schema does not match"
            );
            return Err(InvalidDataError::SchemaMismatch {
                table: self.table_name.clone(),
                mismatches,
            });
        }

        self.connected.store(true, Ordering::Release);
        tracing::debug!(table = %self.table_name, url = %self.url(), "Connected to remote table");
        Ok(())
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.connect().await
    }

    fn column_type(&self, column: &str) -> Result<DomainType> {
        self.get_column_type(column)
            .ok_or_else(|| InvalidDataError::unknown_column(column))
    }

    fn decode_field(
        &self,
        body: &Map<String, JsonValue>,
        field: &str,
        column_type: DomainType,
    ) -> Result<Value> {
        let raw = body.get(field).ok_or_else(|| {
            InvalidDataError::decode(self.url(), format!("response has no {field}"))
        })?;
        coerce(column_type, raw)
    }
}

/// Every difference between the declared and the remote schema
fn schema_mismatches(declared: &Schema, remote: &Schema) -> Vec<String> {
    let mut mismatches = Vec::new();
    if declared.len() != remote.len() {
        mismatches.push(format!(
            "column count: declared {}, remote {}",
            declared.len(),
            remote.len()
        ));
    }
    for (i, (ours, theirs)) in declared.columns().iter().zip(remote.columns()).enumerate() {
        if ours.name != theirs.name {
            mismatches.push(format!(
                "column {i} name: declared {:?}, remote {:?}",
                ours.name, theirs.name
            ));
        }
        if ours.column_type != theirs.column_type {
            mismatches.push(format!(
                "column {i} type: declared {}, remote {}",
                ours.column_type, theirs.column_type
            ));
        }
    }
    mismatches
}

#[async_trait]
impl Table for RemoteDataPlaneTable {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn header_variables(&self) -> &HeaderVariables {
        &self.header_variables
    }

    async fn all_values(&self, column: &str) -> Result<Vec<Value>> {
        let column_type = self.column_type(column)?;
        self.ensure_connected().await?;
        let raw = self.client.get_all_values(&self.table_name, column).await?;
        coerce_list(column_type, &raw)
    }

    async fn range_spec(&self, column: &str) -> Result<RangeSpec> {
        let column_type = self.column_type(column)?;
        self.ensure_connected().await?;
        let body = self.client.get_range_spec(&self.table_name, column).await?;
        Ok(RangeSpec {
            min_val: self.decode_field(&body, "min_val", column_type)?,
            max_val: self.decode_field(&body, "max_val", column_type)?,
        })
    }

    async fn numeric_spec(&self, column: &str) -> Result<NumericSpec> {
        let column_type = self.column_type(column)?;
        if column_type != DomainType::Number {
            return Err(InvalidDataError::NotNumeric {
                column: column.to_string(),
                found: column_type,
            });
        }
        self.ensure_connected().await?;
        let body = self.client.get_numeric_spec(&self.table_name, column).await?;
        let number = |field: &str| -> Result<Number> {
            let value = self.decode_field(&body, field, DomainType::Number)?;
            value
                .as_number()
                .ok_or_else(|| InvalidDataError::decode(self.url(), format!("{field} is not a number")))
        };
        Ok(NumericSpec {
            min_val: number("min_val")?,
            max_val: number("max_val")?,
            increment: number("increment")?,
        })
    }

    async fn get_filtered_rows(
        &self,
        filter: Option<&FilterSpec>,
        columns: &[String],
    ) -> Result<Vec<Row>> {
        self.ensure_connected().await?;

        // Only ask for columns we know; the peer rejects unknown names.
        // An empty list on the wire means every column, so a projection that
        // keeps nothing fetches full rows and empties them locally.
        let keep = projection(&self.schema, columns);
        let keeps_nothing = !columns.is_empty() && keep.is_empty();
        let fetched = if keeps_nothing {
            projection(&self.schema, &[])
        } else {
            keep
        };
        let (names, types): (Vec<String>, Vec<DomainType>) = fetched
            .iter()
            .map(|&i| {
                let column = &self.schema.columns()[i];
                (column.name.clone(), column.column_type)
            })
            .unzip();
        let requested = if columns.is_empty() || keeps_nothing {
            Vec::new()
        } else {
            names
        };

        let raw = self
            .client
            .get_filtered_rows(&self.table_name, filter, &requested)
            .await?;
        let raw: Vec<JsonValue> = raw.into_iter().map(JsonValue::Array).collect();
        let mut rows = coerce_rows(&types, &raw)?;
        if keeps_nothing {
            rows.iter_mut().for_each(Vec::clear);
        }
        tracing::debug!(table = %self.table_name, rows = rows.len(), "Fetched remote rows");
        Ok(rows)
    }

    fn to_json(&self) -> JsonValue {
        let connector = Connector::Dataplane {
            url: self.url().to_string(),
            table: self.table_name.clone(),
        };
        let mut body = json!({ "schema": self.schema.to_json(), "connector": connector });
        if !self.header_variables.is_empty() {
            body["header_variables"] = json!(self.header_variables);
        }
        body
    }
}
