//! Error type for the table registry and table file loading

use std::path::PathBuf;

use dataplane::InvalidDataError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    /// No table registered under this name
    #[error("{table} is not a valid table name")]
    TableNotFound { table: String },

    /// Request headers do not satisfy the table's header requirements
    #[error("Not authorized to access table {table}")]
    TableNotAuthorized { table: String },

    /// Column requested that the table does not have
    #[error("{column} is not a valid column name for table {table}")]
    ColumnNotFound { table: String, column: String },

    /// IO error while reading a table file
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Table file that is not well formed
    #[error("Invalid table file {}: {reason}", path.display())]
    InvalidFile { path: PathBuf, reason: String },

    /// Table file whose contents do not build a table
    #[error("Invalid table in {}: {source}", path.display())]
    Table {
        path: PathBuf,
        #[source]
        source: InvalidDataError,
    },
}

impl DataError {
    pub fn invalid_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn table(path: impl Into<PathBuf>, source: InvalidDataError) -> Self {
        Self::Table {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = DataError::TableNotFound {
            table: "people".to_string(),
        };
        assert_eq!(err.to_string(), "people is not a valid table name");

        let err = DataError::invalid_file("/t/x.csv", "no data rows");
        assert_eq!(err.to_string(), "Invalid table file /t/x.csv: no data rows");
    }
}
