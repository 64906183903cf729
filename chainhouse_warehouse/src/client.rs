//! ClickHouse HTTP client.
//!
//! Uses the plain HTTP interface: the query is POSTed as the request body
//! with `FORMAT JSONEachRow` appended, credentials travel in the
//! `X-ClickHouse-*` headers, and each response line is one JSON row.

use async_trait::async_trait;
use tracing::debug;

use crate::{Warehouse, WarehouseError};

#[derive(Debug, Clone)]
pub struct ClickhouseConfig {
    /// Base URL of the ClickHouse HTTP endpoint, e.g. `http://host:8123`.
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct ClickhouseClient {
    http: reqwest::Client,
    config: ClickhouseConfig,
}

impl ClickhouseClient {
    pub fn new(config: ClickhouseConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Warehouse for ClickhouseClient {
    async fn query_rows(&self, sql: &str) -> Result<Vec<serde_json::Value>, WarehouseError> {
        let query = format!("{sql} FORMAT JSONEachRow");
        debug!(url = %self.config.url, "running warehouse query");

        let mut request = self.http.post(&self.config.url).body(query);
        if !self.config.username.is_empty() {
            request = request
                .header("X-ClickHouse-User", &self.config.username)
                .header("X-ClickHouse-Key", &self.config.password);
        }

        let response = request
            .send()
            .await
            .map_err(|e| WarehouseError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WarehouseError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(WarehouseError::BadResponse(format!(
                "status {status}: {}",
                body.trim()
            )));
        }

        parse_json_each_row(&body)
    }
}

/// Parse a `JSONEachRow` response body: one JSON object per line.
fn parse_json_each_row(body: &str) -> Result<Vec<serde_json::Value>, WarehouseError> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| WarehouseError::BadResponse(e.to_string()))
        })
        .collect()
}
