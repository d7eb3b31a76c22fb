//! REST warehouse client for statement-style query APIs.
//!
//! Submits SQL as plain text to `POST /v1/statement` and follows `nextUri`
//! pages until the result is complete. Provider error messages are passed
//! through verbatim so the model can see and react to them.

use crate::error::{RefineError, Result};
use crate::resultset::{display_value, ResultSet};
use crate::warehouse::{TableInfo, Warehouse};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

pub struct RestWarehouse {
    base_url: String,
    user: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(rename = "nextUri")]
    next_uri: Option<String>,
    columns: Option<Vec<StatementColumn>>,
    data: Option<Vec<Vec<serde_json::Value>>>,
    error: Option<StatementApiError>,
}

#[derive(Debug, Deserialize)]
struct StatementColumn {
    name: String,
}

#[derive(Debug, Deserialize)]
struct StatementApiError {
    message: String,
}

impl RestWarehouse {
    pub fn new(base_url: impl Into<String>, user: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RefineError::Warehouse(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user: user.into(),
            client,
        })
    }

    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("WAREHOUSE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());
        let user = std::env::var("WAREHOUSE_USER").unwrap_or_else(|_| "assistant".to_string());
        Self::new(base_url, user)
    }

    async fn submit(&self, sql: &str, max_bytes_billed: u64) -> Result<StatementResponse> {
        let url = format!("{}/v1/statement", self.base_url);
        info!(sql, "submitting statement to warehouse");

        let response = self
            .client
            .post(&url)
            .header("X-Warehouse-User", &self.user)
            .header("X-Warehouse-Max-Scan-Bytes", max_bytes_billed.to_string())
            .header("Content-Type", "text/plain")
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| RefineError::Warehouse(format!("Statement submission failed: {e}")))?;

        Self::parse_response(response).await
    }

    async fn poll(&self, uri: &str) -> Result<StatementResponse> {
        let response = self
            .client
            .get(uri)
            .header("X-Warehouse-User", &self.user)
            .send()
            .await
            .map_err(|e| RefineError::Warehouse(format!("Statement poll failed: {e}")))?;

        Self::parse_response(response).await
    }

    async fn parse_response(response: reqwest::Response) -> Result<StatementResponse> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RefineError::Query(format!(
                "Warehouse returned {status}: {body}"
            )));
        }
        response
            .json::<StatementResponse>()
            .await
            .map_err(|e| RefineError::Warehouse(format!("Malformed statement response: {e}")))
    }

    /// First column of each row as a string, for introspection queries.
    async fn query_string_column(&self, sql: &str) -> Result<Vec<String>> {
        let result = self.run_query(sql, u64::MAX).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.first().map(display_value))
            .collect())
    }

    fn split_table_id(table_id: &str) -> (&str, &str) {
        match table_id.split_once('.') {
            Some((dataset, table)) => (dataset, table),
            None => ("", table_id),
        }
    }
}

#[async_trait]
impl Warehouse for RestWarehouse {
    async fn list_datasets(&self) -> Result<Vec<String>> {
        self.query_string_column(
            "SELECT schema_name FROM information_schema.schemata ORDER BY schema_name",
        )
        .await
    }

    async fn list_tables(&self, dataset_id: &str) -> Result<Vec<String>> {
        self.query_string_column(&format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = '{dataset_id}' ORDER BY table_name"
        ))
        .await
    }

    async fn get_table(&self, table_id: &str) -> Result<TableInfo> {
        let (dataset, table) = Self::split_table_id(table_id);

        let schema = self
            .query_string_column(&format!(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = '{dataset}' AND table_name = '{table}' \
                 ORDER BY ordinal_position"
            ))
            .await?;
        if schema.is_empty() {
            return Err(RefineError::Warehouse(format!(
                "Unknown table '{table_id}'"
            )));
        }

        let counts = self
            .query_string_column(&format!("SELECT count(*) FROM {table_id}"))
            .await?;
        let row_count = counts
            .first()
            .and_then(|c| c.parse::<u64>().ok())
            .unwrap_or_else(|| {
                warn!(table_id, "could not read row count, defaulting to 0");
                0
            });

        Ok(TableInfo {
            table_id: table.to_string(),
            // The statement API does not expose table comments.
            description: None,
            schema,
            row_count,
        })
    }

    async fn run_query(&self, sql: &str, max_bytes_billed: u64) -> Result<ResultSet> {
        let mut response = self.submit(sql, max_bytes_billed).await?;
        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<serde_json::Value>> = Vec::new();

        loop {
            if let Some(error) = response.error.take() {
                return Err(RefineError::Query(error.message));
            }
            if columns.is_empty() {
                if let Some(cols) = &response.columns {
                    columns = cols.iter().map(|c| c.name.clone()).collect();
                }
            }
            if let Some(data) = response.data.take() {
                rows.extend(data);
            }
            match response.next_uri.take() {
                Some(uri) => response = self.poll(&uri).await?,
                None => break,
            }
        }

        Ok(ResultSet::new(columns, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_qualified_table_ids() {
        assert_eq!(
            RestWarehouse::split_table_id("demo.orders"),
            ("demo", "orders")
        );
        assert_eq!(RestWarehouse::split_table_id("orders"), ("", "orders"));
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let warehouse = RestWarehouse::new("http://localhost:8080/", "tester").unwrap();
        assert_eq!(warehouse.base_url, "http://localhost:8080");
    }
}
