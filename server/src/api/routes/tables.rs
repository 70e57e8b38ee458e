//! Data Plane protocol endpoints
//!
//! Table lookups pass the request headers to the registry, which enforces
//! per-table header requirements. Table handles are cloned out of the
//! registry before any await.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use dataplane::convert::jsonifiable_rows;
use dataplane::table::{NumericSpec, RangeSpec, Table};
use dataplane::{FilterSpec, Value};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue, json};
use validator::Validate;

use crate::api::extractors::{ValidatedJson, ValidatedQuery};
use crate::api::types::ApiError;
use crate::data::{DataError, TableLoader, TableRegistry};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct TablesApiState {
    pub registry: Arc<TableRegistry>,
    pub loader: Arc<TableLoader>,
}

// ============================================================================
// Request DTOs
// ============================================================================

/// `?table_name=...&column_name=...`
#[derive(Debug, Deserialize, Validate)]
pub struct ColumnQuery {
    #[validate(length(min = 1, max = 256, message = "table_name must be 1-256 characters"))]
    pub table_name: Option<String>,
    #[validate(length(min = 1, max = 256, message = "column_name must be 1-256 characters"))]
    pub column_name: Option<String>,
}

impl ColumnQuery {
    fn require(&self) -> Result<(&str, &str), ApiError> {
        match (&self.table_name, &self.column_name) {
            (Some(table), Some(column)) => Ok((table, column)),
            (table, column) => {
                let missing: Vec<&str> = [
                    table.is_none().then_some("table_name"),
                    column.is_none().then_some("column_name"),
                ]
                .into_iter()
                .flatten()
                .collect();
                Err(missing_parameters(&missing))
            }
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct FilteredRowsRequest {
    #[validate(length(min = 1, max = 256, message = "table must be 1-256 characters"))]
    pub table: Option<String>,
    #[serde(default)]
    pub filter: Option<JsonValue>,
    #[serde(default)]
    pub columns: Option<JsonValue>,
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes(registry: Arc<TableRegistry>, loader: Arc<TableLoader>) -> Router<()> {
    let state = TablesApiState { registry, loader };
    Router::new()
        .route("/", get(help))
        .route("/help", get(help))
        .route("/get_filtered_rows", post(get_filtered_rows))
        .route("/get_all_values", get(get_all_values))
        .route("/get_range_spec", get(get_range_spec))
        .route("/get_numeric_spec", get(get_numeric_spec))
        .route("/get_tables", get(get_tables))
        .route("/get_table_spec", get(get_table_spec))
        .route("/init", get(init).post(init))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Rows of a table matching an optional filter, projected onto `columns`
pub async fn get_filtered_rows(
    State(state): State<TablesApiState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<FilteredRowsRequest>,
) -> Result<Json<Vec<Vec<JsonValue>>>, ApiError> {
    let Some(table_name) = req.table.as_deref() else {
        return Err(missing_parameters(&["table"]));
    };
    let table = state.registry.get(table_name, &headers)?;

    let columns = requested_columns(req.columns.as_ref())?;
    for column in &columns {
        require_column(table.as_ref(), table_name, column)?;
    }

    let filter = req.filter.map(FilterSpec::try_from).transpose()?;
    let rows = table.get_filtered_rows(filter.as_ref(), &columns).await?;

    tracing::debug!(table = %table_name, rows = rows.len(), "Filtered rows");
    Ok(Json(jsonifiable_rows(&rows)))
}

/// Sorted distinct values of a column
pub async fn get_all_values(
    State(state): State<TablesApiState>,
    headers: HeaderMap,
    ValidatedQuery(query): ValidatedQuery<ColumnQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let (table_name, column) = query.require()?;
    let table = state.registry.get(table_name, &headers)?;
    require_column(table.as_ref(), table_name, column)?;
    Ok(Json(table.all_values(column).await?))
}

pub async fn get_range_spec(
    State(state): State<TablesApiState>,
    headers: HeaderMap,
    ValidatedQuery(query): ValidatedQuery<ColumnQuery>,
) -> Result<Json<RangeSpec>, ApiError> {
    let (table_name, column) = query.require()?;
    let table = state.registry.get(table_name, &headers)?;
    require_column(table.as_ref(), table_name, column)?;
    Ok(Json(table.range_spec(column).await?))
}

pub async fn get_numeric_spec(
    State(state): State<TablesApiState>,
    headers: HeaderMap,
    ValidatedQuery(query): ValidatedQuery<ColumnQuery>,
) -> Result<Json<NumericSpec>, ApiError> {
    let (table_name, column) = query.require()?;
    let table = state.registry.get(table_name, &headers)?;
    require_column(table.as_ref(), table_name, column)?;
    Ok(Json(table.numeric_spec(column).await?))
}

/// Schemas of the tables the request headers authorize
pub async fn get_tables(
    State(state): State<TablesApiState>,
    headers: HeaderMap,
) -> Json<Map<String, JsonValue>> {
    Json(state.registry.table_dictionary(&headers))
}

/// Header names each table requires
pub async fn get_table_spec(State(state): State<TablesApiState>) -> Json<Map<String, JsonValue>> {
    Json(state.registry.auth_spec())
}

/// Reload every table from the table directories, replacing the current set
pub async fn init(State(state): State<TablesApiState>) -> Json<Map<String, JsonValue>> {
    tracing::info!(dirs = ?state.loader.dirs(), "Reloading tables");
    let fresh = TableRegistry::new();
    let report = state.loader.load_into(&fresh).await;
    if !report.is_clean() {
        tracing::warn!(failed = report.failed.len(), "Some table files failed to load");
    }
    state.registry.replace_all(fresh);
    Json(state.registry.auth_spec())
}

pub async fn help() -> Json<JsonValue> {
    Json(json!({
        "/get_filtered_rows": "POST {table, filter?, columns?}: rows of table matching filter, projected onto columns",
        "/get_all_values": "GET ?table_name&column_name: sorted distinct values of a column",
        "/get_range_spec": "GET ?table_name&column_name: {min_val, max_val} of a column",
        "/get_numeric_spec": "GET ?table_name&column_name: {min_val, max_val, increment} of a number column",
        "/get_tables": "GET: {table_name: schema} for every table the request headers authorize",
        "/get_table_spec": "GET: {table_name: [required header names]}",
        "/init": "GET|POST: reload every table file, then return /get_table_spec",
        "/api/v1/health": "GET: {status, version}"
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn missing_parameters(names: &[&str]) -> ApiError {
    ApiError::bad_request(
        "MISSING_PARAMETERS",
        format!("Missing required parameters: {}", names.join(", ")),
    )
}

fn require_column(table: &dyn Table, table_name: &str, column: &str) -> Result<(), ApiError> {
    if table.get_column_type(column).is_none() {
        return Err(DataError::ColumnNotFound {
            table: table_name.to_string(),
            column: column.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Absent or null means every column
fn requested_columns(raw: Option<&JsonValue>) -> Result<Vec<String>, ApiError> {
    let invalid = || ApiError::bad_request("INVALID_COLUMNS", "columns must be a list of column names");
    match raw {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        Some(_) => Err(invalid()),
    }
}
