//! Table file discovery
//!
//! Two kinds of files are picked up from each configured directory:
//! - `*.json` table specs: `{"name", "table", "headers"?, "header_variables"?}`
//!   where `table` is the JSON form of a table (rows or connector)
//! - `*.csv` tables named after the file stem: row 0 holds column names,
//!   row 1 column types, the rest data converted leniently per column
//!
//! A broken file is reported and skipped; it never stops the others.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dataplane::convert::{ColumnConversion, convert_row};
use dataplane::table::{DataPlaneTable, HeaderVariables, Table, table_from_json};
use dataplane::{ClientOptions, Column, DomainType, Schema};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::error::DataError;
use super::registry::{HeaderRequirement, TableRegistry};
use crate::core::constants::{CSV_TABLE_EXTENSION, TABLE_SPEC_EXTENSION};

/// Contents of a `*.json` table spec file
#[derive(Debug, Deserialize)]
pub struct TableSpecFile {
    pub name: String,
    pub table: JsonValue,
    #[serde(default)]
    pub headers: Vec<HeaderRequirement>,
    #[serde(default)]
    pub header_variables: Option<HeaderVariables>,
}

/// A table read from disk, ready to register
#[derive(Debug)]
pub struct LoadedTable {
    pub name: String,
    pub table: Arc<dyn Table>,
    pub headers: Vec<HeaderRequirement>,
}

/// Outcome of one load pass
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(PathBuf, DataError)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TableLoader {
    dirs: Vec<PathBuf>,
    options: ClientOptions,
}

impl TableLoader {
    pub fn new(dirs: Vec<PathBuf>, options: ClientOptions) -> Self {
        Self { dirs, options }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Load every table file and register what loads
    pub async fn load_into(&self, registry: &TableRegistry) -> LoadReport {
        let mut report = LoadReport::default();

        for dir in &self.dirs {
            let files = match table_files(dir).await {
                Ok(files) => files,
                Err(DataError::Io { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    tracing::debug!(dir = %dir.display(), "Table directory does not exist");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Failed to scan table directory");
                    report.failed.push((dir.clone(), e));
                    continue;
                }
            };

            for path in files {
                match self.load_file(&path).await {
                    Ok(loaded) => {
                        tracing::info!(table = %loaded.name, path = %path.display(), "Loaded table");
                        report.loaded.push(loaded.name.clone());
                        registry.add(loaded.name, loaded.table, loaded.headers);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping table file");
                        report.failed.push((path, e));
                    }
                }
            }
        }

        tracing::debug!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Table load complete"
        );
        report
    }

    /// Load a single `*.json` or `*.csv` file
    pub async fn load_file(&self, path: &Path) -> Result<LoadedTable, DataError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| DataError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        match extension(path).as_deref() {
            Some(TABLE_SPEC_EXTENSION) => self.load_spec(path, &content).await,
            Some(CSV_TABLE_EXTENSION) => {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .ok_or_else(|| DataError::invalid_file(path, "file name is not valid UTF-8"))?
                    .to_string();
                let table = csv_table(path, &content)?;
                Ok(LoadedTable {
                    name,
                    table: Arc::new(table),
                    headers: Vec::new(),
                })
            }
            _ => Err(DataError::invalid_file(path, "not a table file")),
        }
    }

    async fn load_spec(&self, path: &Path, content: &str) -> Result<LoadedTable, DataError> {
        let spec: TableSpecFile = serde_json::from_str(content)
            .map_err(|e| DataError::invalid_file(path, e.to_string()))?;
        if spec.name.trim().is_empty() {
            return Err(DataError::invalid_file(path, "table name must not be empty"));
        }

        let mut table_json = spec.table;
        if let Some(header_variables) = spec.header_variables {
            let Some(body) = table_json.as_object_mut() else {
                return Err(DataError::invalid_file(path, "table must be an object"));
            };
            body.insert("header_variables".to_string(), serde_json::json!(header_variables));
        }

        let table = table_from_json(&table_json, &self.options)
            .await
            .map_err(|e| DataError::table(path, e))?;
        Ok(LoadedTable {
            name: spec.name,
            table,
            headers: spec.headers,
        })
    }
}

/// Table files in `dir`, sorted by path so load order is stable
async fn table_files(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let io_error = |source| DataError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let path = entry.path();
        let is_table = matches!(
            extension(&path).as_deref(),
            Some(TABLE_SPEC_EXTENSION | CSV_TABLE_EXTENSION)
        );
        if is_table && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Build a table from CSV text with a names row and a types row
pub fn csv_table(path: &Path, content: &str) -> Result<DataPlaneTable, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DataError::invalid_file(path, e.to_string()))?;
        records.push(record);
    }

    if records.len() < 3 {
        return Err(DataError::invalid_file(
            path,
            "needs a names row, a types row and at least one data row",
        ));
    }
    let width = records[0].len();
    if let Some((i, record)) = records.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(DataError::invalid_file(
            path,
            format!("row {i} has {} cells, expected {width}", record.len()),
        ));
    }

    let mut columns = Vec::with_capacity(width);
    for (name, type_name) in records[0].iter().zip(records[1].iter()) {
        let column_type = DomainType::parse(type_name).ok_or_else(|| {
            DataError::invalid_file(
                path,
                format!("column {name} has unknown type {type_name}"),
            )
        })?;
        columns.push(Column::new(name, column_type));
    }
    let schema = Schema::new(columns);

    let conversions: Vec<ColumnConversion> = schema
        .types()
        .into_iter()
        .map(ColumnConversion::new)
        .collect();
    let rows = records[2..]
        .iter()
        .map(|record| {
            let cells: Vec<JsonValue> = record
                .iter()
                .map(|cell| JsonValue::String(cell.to_string()))
                .collect();
            convert_row(&conversions, &cells)
        })
        .collect();

    Ok(DataPlaneTable::from_rows(schema, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataplane::{Number, Value};
    use serde_json::json;
    use std::fs;

    const PEOPLE_CSV: &str = "name,age,member\nstring,number,boolean\nTed,21,true\nAlice,n/a,false\n";

    #[test]
    fn test_csv_table() {
        let table = csv_table(Path::new("people.csv"), PEOPLE_CSV).unwrap();
        assert_eq!(table.column_names(), vec!["name", "age", "member"]);
        assert_eq!(
            table.column_types(),
            vec![DomainType::String, DomainType::Number, DomainType::Boolean]
        );
        let rows = table.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], Value::Number(Number::Float(21.0)));
        // Unreadable numbers fall back to NaN
        assert!(rows[1][1].as_number().unwrap().is_nan());
        assert_eq!(rows[1][2], Value::Boolean(false));
    }

    #[test]
    fn test_csv_table_rejects_bad_shapes() {
        let path = Path::new("t.csv");
        assert!(csv_table(path, "a,b\nstring,number\n").is_err());
        assert!(csv_table(path, "a,b\nstring,number\nx\n").is_err());

        let err = csv_table(path, "a\ncolour\nred\n").unwrap_err();
        assert!(err.to_string().contains("unknown type colour"));
    }

    #[tokio::test]
    async fn test_load_into_registers_both_kinds() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("people.csv"), PEOPLE_CSV).unwrap();
        fs::write(
            dir.path().join("scores.json"),
            json!({
                "name": "scores",
                "table": {
                    "schema": [{"name": "score", "type": "number"}],
                    "rows": [[1], [2.5]]
                },
                "headers": [{"variable": "user", "value": "ted"}],
                "header_variables": {"required": ["user"]}
            })
            .to_string(),
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = TableRegistry::new();
        let loader = TableLoader::new(vec![dir.path().to_path_buf()], ClientOptions::default());
        let report = loader.load_into(&registry).await;

        assert!(report.is_clean());
        assert_eq!(report.loaded, vec!["people", "scores"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.auth_spec()["scores"], json!(["user"]));
    }

    #[tokio::test]
    async fn test_load_into_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.csv"), PEOPLE_CSV).unwrap();
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        fs::write(
            dir.path().join("badrow.json"),
            json!({
                "name": "badrow",
                "table": {"schema": [{"name": "n", "type": "number"}], "rows": [["x"]]}
            })
            .to_string(),
        )
        .unwrap();

        let registry = TableRegistry::new();
        let loader = TableLoader::new(
            vec![dir.path().to_path_buf(), dir.path().join("missing")],
            ClientOptions::default(),
        );
        let report = loader.load_into(&registry).await;

        assert_eq!(report.loaded, vec!["good"]);
        assert_eq!(report.failed.len(), 2);
        assert!(matches!(report.failed[0].1, DataError::InvalidFile { .. }));
        assert!(matches!(report.failed[1].1, DataError::Table { .. }));
    }
}
