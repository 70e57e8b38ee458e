//! Tables downloaded once from a CSV URL

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

use super::descriptor::Connector;
use super::{DataFrame, DataFrameTable, HeaderVariables, RangeSpec, Table};
use crate::client::validate_url;
use crate::error::{InvalidDataError, Result};
use crate::filter::FilterSpec;
use crate::types::{Row, Schema, Value};

/// CSV fetched eagerly at construction and served from memory as a
/// [`DataFrameTable`]
#[derive(Debug, Clone)]
pub struct RemoteCsvTable {
    url: String,
    inner: DataFrameTable,
}

impl RemoteCsvTable {
    pub async fn fetch(schema: Schema, url: &str) -> Result<Self> {
        let client = reqwest::Client::new();
        Self::fetch_with(&client, schema, url).await
    }

    pub async fn fetch_with(client: &reqwest::Client, schema: Schema, url: &str) -> Result<Self> {
        validate_url(url)?;
        tracing::debug!(url = %url, "Downloading CSV table");

        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| InvalidDataError::transport(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(InvalidDataError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| InvalidDataError::transport(url, e))?;

        let frame = DataFrame::from_csv(bytes.as_ref())?;
        let inner = DataFrameTable::new(schema, &frame)?;
        tracing::info!(url = %url, rows = frame.num_rows(), "Loaded CSV table");
        Ok(Self {
            url: url.to_string(),
            inner,
        })
    }

    pub fn with_header_variables(mut self, header_variables: HeaderVariables) -> Self {
        self.inner = self.inner.with_header_variables(header_variables);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Table for RemoteCsvTable {
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn header_variables(&self) -> &HeaderVariables {
        self.inner.header_variables()
    }

    async fn all_values(&self, column: &str) -> Result<Vec<Value>> {
        self.inner.all_values(column).await
    }

    async fn range_spec(&self, column: &str) -> Result<RangeSpec> {
        self.inner.range_spec(column).await
    }

    async fn get_filtered_rows(
        &self,
        filter: Option<&FilterSpec>,
        columns: &[String],
    ) -> Result<Vec<Row>> {
        self.inner.get_filtered_rows(filter, columns).await
    }

    fn to_json(&self) -> JsonValue {
        let connector = Connector::Csv {
            url: self.url.clone(),
        };
        let mut body = json!({ "schema": self.schema().to_json(), "connector": connector });
        if !self.header_variables().is_empty() {
            body["header_variables"] = json!(self.header_variables());
        }
        body
    }
}
