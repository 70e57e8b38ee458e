//! Rebuilding tables from their JSON form
//!
//! A table serializes either as `{"schema", "rows"}` or, when backed by a
//! remote source, as `{"schema", "connector": {"kind", "url", ...}}`.
//! Both forms may carry `"header_variables"`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{DataPlaneTable, HeaderVariables, RemoteCsvTable, RemoteDataPlaneTable, Table};
use crate::client::ClientOptions;
use crate::error::{InvalidDataError, Result};
use crate::types::Schema;

/// Where a connector-backed table gets its data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Connector {
    /// CSV file downloaded once
    Csv { url: String },
    /// Table on another data plane server
    Dataplane { url: String, table: String },
}

/// Build a table from its JSON form. CSV connectors download immediately;
/// data plane connectors defer to their first operation.
pub async fn table_from_json(raw: &JsonValue, options: &ClientOptions) -> Result<Arc<dyn Table>> {
    let invalid = |reason: String| InvalidDataError::InvalidTable { reason };

    let Some(body) = raw.as_object() else {
        return Err(invalid(format!("expected an object, found {raw}")));
    };
    let schema = body
        .get("schema")
        .ok_or_else(|| invalid("missing schema".to_string()))?;
    let header_variables: HeaderVariables = match body.get("header_variables") {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| invalid(format!("bad header_variables: {e}")))?,
        None => HeaderVariables::default(),
    };

    if let Some(connector) = body.get("connector") {
        let schema = Schema::from_json(schema)?;
        let connector: Connector = serde_json::from_value(connector.clone())
            .map_err(|e| invalid(format!("bad connector: {e}")))?;
        return match connector {
            Connector::Csv { url } => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = options.timeout {
                    builder = builder.timeout(timeout);
                }
                let client = builder
                    .build()
                    .map_err(|e| InvalidDataError::transport(&url, e))?;
                let table = RemoteCsvTable::fetch_with(&client, schema, &url)
                    .await?
                    .with_header_variables(header_variables);
                Ok(Arc::new(table))
            }
            Connector::Dataplane { url, table } => {
                let table = RemoteDataPlaneTable::with_options(table, &url, schema, options)?
                    .with_header_variables(header_variables);
                Ok(Arc::new(table))
            }
        };
    }

    let rows = body
        .get("rows")
        .ok_or_else(|| invalid("table needs either rows or a connector".to_string()))?;
    let rows = rows
        .as_array()
        .ok_or_else(|| invalid(format!("rows must be a list, found {rows}")))?;
    let table = DataPlaneTable::from_json_rows(schema, rows)?.with_header_variables(header_variables);
    Ok(Arc::new(table))
}
