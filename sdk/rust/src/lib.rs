//! Data Plane: typed tables served over HTTP with a JSON filter language
//!
//! The crate has four layers:
//!
//! - [`types`] and [`convert`]: the six scalar domain types and the coercion
//!   rules that turn raw JSON (or native values) into them.
//! - [`filter`]: the filter specification grammar, its validation, and the
//!   compiled evaluator that selects row indices.
//! - [`table`]: the [`Table`] contract and its variants (in-memory rows,
//!   dataframes, remote CSV files, remote data plane servers).
//! - [`client`]: the HTTP client for the data plane protocol.
//!
//! ```no_run
//! use dataplane::{DataPlaneTable, FilterSpec, Table};
//! use serde_json::json;
//!
//! # async fn run() -> dataplane::Result<()> {
//! let table = DataPlaneTable::from_json_rows(
//!     &json!([{"name": "name", "type": "string"}, {"name": "age", "type": "number"}]),
//!     &[json!(["Ted", 21]), json!(["Alice", 24]), json!(["Jane", 20])],
//! )?;
//! let filter = FilterSpec::parse(&json!({
//!     "operator": "IN_RANGE", "column": "age", "min_val": 21, "max_val": 24
//! }))?;
//! let rows = table.get_filtered_rows(Some(&filter), &[]).await?;
//! assert_eq!(rows.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod convert;
pub mod error;
pub mod filter;
pub mod table;
pub mod types;

pub use client::{ClientOptions, DataPlaneClient};
pub use error::{InvalidDataError, Result};
pub use filter::{DataPlaneFilter, FilterOperator, FilterSpec};
pub use table::{
    Connector, DataFrame, DataFrameTable, DataPlaneTable, HeaderVariables, NumericSpec, RangeSpec,
    RemoteCsvTable, RemoteDataPlaneTable, Table, table_from_json,
};
pub use types::{Column, DomainType, Number, Row, Schema, Value};
