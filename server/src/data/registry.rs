//! Named tables served by this process
//!
//! Each table may require request headers with exact values before it is
//! visible. Header names match case-insensitively.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::http::HeaderMap;
use dataplane::table::Table;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::error::DataError;

/// A header that must be present with exactly `value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRequirement {
    pub variable: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct RegisteredTable {
    pub table: Arc<dyn Table>,
    pub headers: Vec<HeaderRequirement>,
}

impl RegisteredTable {
    /// True iff every required header is present with the same value
    pub fn authorizes(&self, headers: &HeaderMap) -> bool {
        self.headers.iter().all(|required| {
            headers
                .get(required.variable.as_str())
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == required.value)
        })
    }

    /// Header names a client must send: registered requirements plus the
    /// table's own required header variables
    pub fn required_headers(&self) -> Vec<String> {
        self.headers
            .iter()
            .map(|h| h.variable.clone())
            .chain(self.table.header_variables().required.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: RwLock<BTreeMap<String, RegisteredTable>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `table` under `name`, replacing any table of that name
    pub fn add(
        &self,
        name: impl Into<String>,
        table: Arc<dyn Table>,
        headers: Vec<HeaderRequirement>,
    ) {
        let name = name.into();
        tracing::debug!(table = %name, headers = headers.len(), "Registering table");
        if self
            .tables
            .write()
            .insert(name.clone(), RegisteredTable { table, headers })
            .is_some()
        {
            tracing::warn!(table = %name, "Replaced previously registered table");
        }
    }

    /// The table called `name`, if `headers` authorize it
    pub fn get(&self, name: &str, headers: &HeaderMap) -> Result<Arc<dyn Table>, DataError> {
        let tables = self.tables.read();
        let entry = tables.get(name).ok_or_else(|| DataError::TableNotFound {
            table: name.to_string(),
        })?;
        if !entry.authorizes(headers) {
            return Err(DataError::TableNotAuthorized {
                table: name.to_string(),
            });
        }
        Ok(Arc::clone(&entry.table))
    }

    /// `{name: schema}` for every table `headers` authorize
    pub fn table_dictionary(&self, headers: &HeaderMap) -> Map<String, JsonValue> {
        self.tables
            .read()
            .iter()
            .filter(|(_, entry)| entry.authorizes(headers))
            .map(|(name, entry)| (name.clone(), entry.table.schema().to_json()))
            .collect()
    }

    /// `{name: [required header names]}` for every table
    pub fn auth_spec(&self) -> Map<String, JsonValue> {
        self.tables
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), JsonValue::from(entry.required_headers())))
            .collect()
    }

    /// Swap in every table of `fresh`, dropping the current ones in the same
    /// write so readers never see an empty registry
    pub fn replace_all(&self, fresh: TableRegistry) {
        let fresh = fresh.tables.into_inner();
        let mut tables = self.tables.write();
        tracing::debug!(
            dropped = tables.len(),
            added = fresh.len(),
            "Replacing table registry"
        );
        *tables = fresh;
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use dataplane::table::{DataPlaneTable, HeaderVariables};
    use dataplane::{Column, DomainType, Schema, Value};
    use serde_json::json;

    fn people() -> Arc<dyn Table> {
        let schema = Schema::new(vec![
            Column::new("name", DomainType::String),
            Column::new("age", DomainType::Number),
        ]);
        Arc::new(DataPlaneTable::from_rows(
            schema,
            vec![vec![Value::from("Ted"), Value::from(21i64)]],
        ))
    }

    fn secret() -> Vec<HeaderRequirement> {
        vec![HeaderRequirement {
            variable: "X-Api-Key".to_string(),
            value: "s3cret".to_string(),
        }]
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_get_open_table() {
        let registry = TableRegistry::new();
        registry.add("people", people(), Vec::new());
        let table = registry.get("people", &HeaderMap::new()).unwrap();
        assert_eq!(table.column_names(), vec!["name", "age"]);
    }

    #[test]
    fn test_get_unknown_table() {
        let registry = TableRegistry::new();
        assert!(matches!(
            registry.get("nope", &HeaderMap::new()),
            Err(DataError::TableNotFound { table }) if table == "nope"
        ));
    }

    #[test]
    fn test_header_authorization_is_case_insensitive() {
        let registry = TableRegistry::new();
        registry.add("people", people(), secret());

        assert!(matches!(
            registry.get("people", &HeaderMap::new()),
            Err(DataError::TableNotAuthorized { .. })
        ));
        assert!(matches!(
            registry.get("people", &headers(&[("x-api-key", "wrong")])),
            Err(DataError::TableNotAuthorized { .. })
        ));
        assert!(registry.get("people", &headers(&[("x-api-key", "s3cret")])).is_ok());
    }

    #[test]
    fn test_table_dictionary_filters_unauthorized() {
        let registry = TableRegistry::new();
        registry.add("open", people(), Vec::new());
        registry.add("closed", people(), secret());

        let visible = registry.table_dictionary(&HeaderMap::new());
        assert_eq!(visible.keys().collect::<Vec<_>>(), vec!["open"]);
        assert_eq!(
            visible["open"],
            json!([{"name": "name", "type": "string"}, {"name": "age", "type": "number"}])
        );

        let all = registry.table_dictionary(&headers(&[("x-api-key", "s3cret")]));
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_auth_spec_merges_header_variables() {
        let registry = TableRegistry::new();
        let schema = Schema::new(vec![Column::new("a", DomainType::String)]);
        let table = DataPlaneTable::from_rows(schema, Vec::new()).with_header_variables(
            HeaderVariables {
                required: vec!["user".to_string(), "X-Api-Key".to_string()],
                optional: vec!["locale".to_string()],
            },
        );
        registry.add("t", Arc::new(table), secret());
        registry.add("open", people(), Vec::new());

        let spec = registry.auth_spec();
        assert_eq!(spec["t"], json!(["X-Api-Key", "user"]));
        assert_eq!(spec["open"], json!([]));
    }

    #[test]
    fn test_replace_all() {
        let registry = TableRegistry::new();
        registry.add("people", people(), Vec::new());
        registry.add("stale", people(), Vec::new());

        let fresh = TableRegistry::new();
        fresh.add("people", people(), secret());
        // Current tables stay visible while the replacement is built
        assert!(registry.get("stale", &HeaderMap::new()).is_ok());

        registry.replace_all(fresh);
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.get("stale", &HeaderMap::new()),
            Err(DataError::TableNotFound { .. })
        ));
        assert!(matches!(
            registry.get("people", &HeaderMap::new()),
            Err(DataError::TableNotAuthorized { .. })
        ));
    }
}
