//! Error type for the data plane core
//!
//! Every failure the core can report is an [`InvalidDataError`]. Each
//! variant carries the offending value, column, operator or URL so callers
//! can build their own diagnostics without re-parsing the request.

use thiserror::Error;

use crate::types::DomainType;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, InvalidDataError>;

#[derive(Error, Debug)]
pub enum InvalidDataError {
    // Filter specification structure
    #[error("filter_spec must be an object, not {found}")]
    SpecNotObject { found: String },

    #[error("There is no operator in {spec}")]
    MissingOperator { spec: String },

    #[error("operator {operator} is not a string")]
    OperatorNotString { operator: String },

    #[error("{operator} is not a valid operator. Valid operators are {valid}")]
    UnknownOperator { operator: String, valid: String },

    #[error("{operator} filter {spec} is missing required fields {}", .fields.join(", "))]
    MissingFields {
        operator: &'static str,
        spec: String,
        fields: Vec<&'static str>,
    },

    #[error("The {field} field for {operator} must be a list, not {found}")]
    NotAList {
        operator: &'static str,
        field: &'static str,
        found: String,
    },

    #[error("The {field} field for {operator} must be a string, not {found}")]
    NotAString {
        operator: &'static str,
        field: &'static str,
        found: String,
    },

    #[error("{field} {found} for an IN_RANGE filter must be a scalar")]
    RangeBoundNotScalar { field: &'static str, found: String },

    #[error("max_val {max_val} and min_val {min_val} must be comparable for an IN_RANGE filter")]
    IncomparableRange { min_val: String, max_val: String },

    #[error("{expression} is not a valid regular expression: {reason}")]
    InvalidRegex { expression: String, reason: String },

    // Schema and columns
    #[error("Invalid column specification {found}: {reason}")]
    InvalidSchema { found: String, reason: String },

    #[error("{column} is not a valid column name")]
    UnknownColumn { column: String },

    #[error("The column type for a REGEX filter must be string, not {found} (column {column})")]
    RegexColumnType { column: String, found: DomainType },

    #[error("Column {column} must be of type number, not {found}")]
    NotNumeric { column: String, found: DomainType },

    #[error("Bad data in column {column}: NaN values have no increment")]
    NanInColumn { column: String },

    #[error("Column {column} needs at least two distinct values to compute an increment")]
    NoIncrement { column: String },

    #[error("Column {column} has no values")]
    EmptyColumn { column: String },

    // Coercion
    #[error("Cannot convert {value} to {to}")]
    Coercion { value: String, to: DomainType },

    #[error("Failed to convert {values} to {to}")]
    CollectionCoercion { values: String, to: DomainType },

    #[error("Row {row} has {found} values but the schema has {expected} columns")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Failed to convert column {column}: {reason}")]
    ColumnConversion { column: String, reason: String },

    #[error("Invalid CSV data: {reason}")]
    Csv { reason: String },

    #[error("Invalid table description: {reason}")]
    InvalidTable { reason: String },

    // Remote tables
    #[error("Invalid data plane URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Bad JSON from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Server {url} does not have table {table}")]
    TableNotListed { url: String, table: String },

    #[error("Schema mismatch for remote table {table}: {}", .mismatches.join("; "))]
    SchemaMismatch {
        table: String,
        mismatches: Vec<String>,
    },
}

impl InvalidDataError {
    pub fn coercion(value: impl std::fmt::Display, to: DomainType) -> Self {
        Self::Coercion {
            value: value.to_string(),
            to,
        }
    }

    pub fn unknown_column(column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            column: column.into(),
        }
    }

    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    pub fn decode(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures caused by talking to a peer rather than by the
    /// caller's data
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::Status { .. }
                | Self::Decode { .. }
                | Self::TableNotListed { .. }
                | Self::SchemaMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_message_lists_fields() {
        let err = InvalidDataError::MissingFields {
            operator: "IN_RANGE",
            spec: "{}".to_string(),
            fields: vec!["column", "max_val"],
        };
        assert_eq!(
            err.to_string(),
            "IN_RANGE filter {} is missing required fields column, max_val"
        );
    }

    #[test]
    fn test_schema_mismatch_message_lists_every_field() {
        let err = InvalidDataError::SchemaMismatch {
            table: "people".to_string(),
            mismatches: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Schema mismatch for remote table people: a; b");
        assert!(err.is_remote());
    }

    #[test]
    fn test_coercion_names_target_type() {
        let err = InvalidDataError::coercion("\"abc\"", DomainType::Number);
        assert_eq!(err.to_string(), "Cannot convert \"abc\" to number");
        assert!(!err.is_remote());
    }
}
