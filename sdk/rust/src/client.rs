//! HTTP client for the data plane protocol
//!
//! Thin wrapper over `reqwest` that knows the route names and parameter
//! conventions of a data plane server. Responses are returned as raw JSON;
//! typed decoding is left to the caller (see
//! [`RemoteDataPlaneTable`](crate::table::RemoteDataPlaneTable)).

use std::time::Duration;

use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue, json};

use crate::error::{InvalidDataError, Result};
use crate::filter::FilterSpec;

pub const ROUTE_GET_TABLES: &str = "get_tables";
pub const ROUTE_GET_TABLE_SPEC: &str = "get_table_spec";
pub const ROUTE_GET_ALL_VALUES: &str = "get_all_values";
pub const ROUTE_GET_RANGE_SPEC: &str = "get_range_spec";
pub const ROUTE_GET_NUMERIC_SPEC: &str = "get_numeric_spec";
pub const ROUTE_GET_FILTERED_ROWS: &str = "get_filtered_rows";

/// Per-client request options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// Headers sent with every request (e.g. table authorization headers)
    pub headers: Vec<(String, String)>,
    /// Upper bound for a whole request; `None` leaves requests unbounded
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct DataPlaneClient {
    base_url: String,
    client: reqwest::Client,
}

impl DataPlaneClient {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_options(url, &ClientOptions::default())
    }

    pub fn with_options(url: &str, options: &ClientOptions) -> Result<Self> {
        let base_url = validate_url(url)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| InvalidDataError::InvalidUrl {
                    url: base_url.clone(),
                    reason: format!("invalid header name {name}: {e}"),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| InvalidDataError::InvalidUrl {
                    url: base_url.clone(),
                    reason: format!("invalid value for header {name}: {e}"),
                })?;
            headers.insert(header_name, header_value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| InvalidDataError::transport(&base_url, e))?;

        tracing::debug!(url = %base_url, "Data plane client initialized");
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{table_name: schema}` for every table the server lets us see
    pub async fn get_tables(&self) -> Result<Map<String, JsonValue>> {
        let url = self.endpoint(ROUTE_GET_TABLES, &[])?;
        self.send(self.client.get(url.clone()), &url).await
    }

    /// `{table_name: [required header names]}`
    pub async fn get_table_spec(&self) -> Result<Map<String, JsonValue>> {
        let url = self.endpoint(ROUTE_GET_TABLE_SPEC, &[])?;
        self.send(self.client.get(url.clone()), &url).await
    }

    pub async fn get_all_values(&self, table: &str, column: &str) -> Result<Vec<JsonValue>> {
        let url = self.endpoint(
            ROUTE_GET_ALL_VALUES,
            &[("table_name", table), ("column_name", column)],
        )?;
        self.send(self.client.get(url.clone()), &url).await
    }

    /// `{"min_val", "max_val"}`
    pub async fn get_range_spec(&self, table: &str, column: &str) -> Result<Map<String, JsonValue>> {
        let url = self.endpoint(
            ROUTE_GET_RANGE_SPEC,
            &[("table_name", table), ("column_name", column)],
        )?;
        self.send(self.client.get(url.clone()), &url).await
    }

    /// `{"min_val", "max_val", "increment"}`
    pub async fn get_numeric_spec(
        &self,
        table: &str,
        column: &str,
    ) -> Result<Map<String, JsonValue>> {
        let url = self.endpoint(
            ROUTE_GET_NUMERIC_SPEC,
            &[("table_name", table), ("column_name", column)],
        )?;
        self.send(self.client.get(url.clone()), &url).await
    }

    pub async fn get_filtered_rows(
        &self,
        table: &str,
        filter: Option<&FilterSpec>,
        columns: &[String],
    ) -> Result<Vec<Vec<JsonValue>>> {
        let url = self.endpoint(ROUTE_GET_FILTERED_ROWS, &[])?;
        let mut body = json!({ "table": table, "columns": columns });
        if let Some(filter) = filter {
            body["filter"] = filter.to_json();
        }
        self.send(self.client.post(url.clone()).json(&body), &url).await
    }

    fn endpoint(&self, route: &str, params: &[(&str, &str)]) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, route);
        let mut url = Url::parse(&raw).map_err(|e| InvalidDataError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<T> {
        tracing::debug!(url = %url, "Data plane request");
        let resp = request
            .send()
            .await
            .map_err(|e| InvalidDataError::transport(url.as_str(), e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(url = %url, status = status.as_u16(), "Data plane request failed");
            return Err(InvalidDataError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| InvalidDataError::transport(url.as_str(), e))?;
        serde_json::from_slice(&bytes).map_err(|e| InvalidDataError::decode(url.as_str(), e))
    }
}

/// Accept only absolute http(s) URLs with a host. Returns the URL without a
/// trailing slash.
pub fn validate_url(url: &str) -> Result<String> {
    let invalid = |reason: &str| InvalidDataError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(url.trim_end_matches('/').to_string())
}
