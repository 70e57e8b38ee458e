//! Table abstraction
//!
//! Every table variant implements [`Table`]: schema introspection, distinct
//! values, range queries and filtered, projected row retrieval. Local
//! variants answer from materialized rows; [`RemoteDataPlaneTable`] forwards
//! each call to a peer data plane server.

mod descriptor;
mod fixed;
mod frame;
mod remote;
mod remote_csv;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::convert::convert;
use crate::error::{InvalidDataError, Result};
use crate::filter::{DataPlaneFilter, FilterSpec};
use crate::types::{DomainType, Number, Row, Schema, Value};

pub use descriptor::{Connector, table_from_json};
pub use fixed::{DataPlaneTable, RowProducer};
pub use frame::{DataFrame, DataFrameTable};
pub use remote::RemoteDataPlaneTable;
pub use remote_csv::RemoteCsvTable;

// =============================================================================
// Result types
// =============================================================================

/// Smallest and largest distinct value of a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeSpec {
    pub min_val: Value,
    pub max_val: Value,
}

/// Range of a numeric column plus the smallest positive step between
/// consecutive distinct values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NumericSpec {
    pub min_val: Number,
    pub max_val: Number,
    pub increment: Number,
}

/// Names of request header variables a table expects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderVariables {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

impl HeaderVariables {
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.optional.is_empty()
    }
}

// =============================================================================
// Table contract
// =============================================================================

#[async_trait]
pub trait Table: Send + Sync + fmt::Debug {
    fn schema(&self) -> &Schema;

    fn header_variables(&self) -> &HeaderVariables;

    fn column_names(&self) -> Vec<String> {
        self.schema().names()
    }

    fn column_types(&self) -> Vec<DomainType> {
        self.schema().types()
    }

    /// `None` for a column this table does not have
    fn get_column_type(&self, column: &str) -> Option<DomainType> {
        self.schema().column_type(column)
    }

    /// Sorted distinct values of `column`
    async fn all_values(&self, column: &str) -> Result<Vec<Value>>;

    /// First and last of the sorted distinct values of `column`
    async fn range_spec(&self, column: &str) -> Result<RangeSpec>;

    /// Range plus increment of a Number column
    async fn numeric_spec(&self, column: &str) -> Result<NumericSpec> {
        match self.get_column_type(column) {
            None => Err(InvalidDataError::unknown_column(column)),
            Some(DomainType::Number) => {
                let values = self.all_values(column).await?;
                numeric_spec_of(column, &values)
            }
            Some(found) => Err(InvalidDataError::NotNumeric {
                column: column.to_string(),
                found,
            }),
        }
    }

    /// Rows accepted by `filter` (all rows when `None`), projected onto
    /// `columns` in schema order. Empty `columns` means every column and
    /// names the schema does not have are ignored.
    async fn get_filtered_rows(
        &self,
        filter: Option<&FilterSpec>,
        columns: &[String],
    ) -> Result<Vec<Row>>;

    /// Schema plus rows, or a connector descriptor for tables backed by a
    /// remote source
    fn to_json(&self) -> JsonValue;
}

// =============================================================================
// Shared helpers for local tables
// =============================================================================

/// Sorted distinct values of one column of materialized rows
pub(crate) fn distinct_values(schema: &Schema, rows: &[Row], column: &str) -> Result<Vec<Value>> {
    let index = schema
        .index_of(column)
        .ok_or_else(|| InvalidDataError::unknown_column(column))?;
    let column_type = schema.columns()[index].column_type;
    let distinct = rows
        .iter()
        .filter_map(|row| row.get(index).cloned())
        .map(|value| convert(column_type, value))
        .collect::<Result<BTreeSet<Value>>>()?;
    Ok(distinct.into_iter().collect())
}

/// Range of already sorted distinct values
pub(crate) fn range_of(column: &str, sorted: Vec<Value>) -> Result<RangeSpec> {
    let mut values = sorted.into_iter();
    let Some(min_val) = values.next() else {
        return Err(InvalidDataError::EmptyColumn {
            column: column.to_string(),
        });
    };
    let max_val = values.next_back().unwrap_or_else(|| min_val.clone());
    Ok(RangeSpec { min_val, max_val })
}

/// Min, max and smallest positive difference of sorted distinct numbers
pub fn numeric_spec_of(column: &str, sorted: &[Value]) -> Result<NumericSpec> {
    let numbers = sorted
        .iter()
        .map(|v| {
            v.as_number().ok_or_else(|| InvalidDataError::NotNumeric {
                column: column.to_string(),
                found: v.domain_type(),
            })
        })
        .collect::<Result<Vec<Number>>>()?;
    if numbers.iter().any(|n| n.is_nan()) {
        return Err(InvalidDataError::NanInColumn {
            column: column.to_string(),
        });
    }

    let increment = numbers
        .windows(2)
        .map(|pair| pair[1].difference(pair[0]))
        .filter(|step| *step > Number::Int(0))
        .min();
    match (numbers.first(), numbers.last(), increment) {
        (Some(min_val), Some(max_val), Some(increment)) => Ok(NumericSpec {
            min_val: *min_val,
            max_val: *max_val,
            increment,
        }),
        _ => Err(InvalidDataError::NoIncrement {
            column: column.to_string(),
        }),
    }
}

/// Indices of the schema columns to keep, in schema order
pub(crate) fn projection(schema: &Schema, columns: &[String]) -> Vec<usize> {
    schema
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| columns.is_empty() || columns.contains(&c.name))
        .map(|(i, _)| i)
        .collect()
}

/// Filter then project materialized rows
pub(crate) fn select_rows(
    schema: &Schema,
    rows: Vec<Row>,
    filter: Option<&FilterSpec>,
    columns: &[String],
) -> Result<Vec<Row>> {
    let rows = match filter {
        Some(spec) => DataPlaneFilter::new(spec, schema)?.filter(rows),
        None => rows,
    };
    if columns.is_empty() {
        return Ok(rows);
    }
    let keep = projection(schema, columns);
    Ok(rows
        .into_iter()
        .map(|row| keep.iter().filter_map(|&i| row.get(i).cloned()).collect())
        .collect())
}
