//! In-process warehouse backed by fixture tables and canned query results.
//!
//! Used by tests and by the demo binary when no live warehouse is
//! configured. Queries are answered by exact-match lookup against the
//! registered statements.

use crate::error::{RefineError, Result};
use crate::resultset::ResultSet;
use crate::warehouse::{TableInfo, Warehouse};
use async_trait::async_trait;
use std::collections::HashMap;

pub struct MemoryWarehouse {
    dataset_id: String,
    tables: Vec<TableInfo>,
    queries: HashMap<String, std::result::Result<ResultSet, String>>,
}

impl MemoryWarehouse {
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            tables: Vec::new(),
            queries: HashMap::new(),
        }
    }

    pub fn with_table(
        mut self,
        table_id: impl Into<String>,
        description: Option<&str>,
        columns: &[&str],
        row_count: u64,
    ) -> Self {
        self.tables.push(TableInfo {
            table_id: table_id.into(),
            description: description.map(str::to_string),
            schema: columns.iter().map(|c| c.to_string()).collect(),
            row_count,
        });
        self
    }

    /// Register the result returned for an exact statement text.
    pub fn with_query_result(mut self, sql: impl Into<String>, result: ResultSet) -> Self {
        self.queries.insert(sql.into(), Ok(result));
        self
    }

    /// Register a provider failure for an exact statement text.
    pub fn with_query_error(mut self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        self.queries.insert(sql.into(), Err(message.into()));
        self
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn list_datasets(&self) -> Result<Vec<String>> {
        Ok(vec![self.dataset_id.clone()])
    }

    async fn list_tables(&self, dataset_id: &str) -> Result<Vec<String>> {
        if dataset_id != self.dataset_id {
            return Err(RefineError::Warehouse(format!(
                "Unknown dataset '{dataset_id}'"
            )));
        }
        Ok(self.tables.iter().map(|t| t.table_id.clone()).collect())
    }

    async fn get_table(&self, table_id: &str) -> Result<TableInfo> {
        let bare = table_id.rsplit('.').next().unwrap_or(table_id);
        self.tables
            .iter()
            .find(|t| t.table_id == bare)
            .cloned()
            .ok_or_else(|| RefineError::Warehouse(format!("Unknown table '{table_id}'")))
    }

    async fn run_query(&self, sql: &str, _max_bytes_billed: u64) -> Result<ResultSet> {
        match self.queries.get(sql) {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(message)) => Err(RefineError::Query(message.clone())),
            None => Err(RefineError::Query(format!(
                "No result registered for query '{sql}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn warehouse() -> MemoryWarehouse {
        MemoryWarehouse::new("demo")
            .with_table("orders", Some("customer orders"), &["order_id", "amount"], 42)
            .with_query_result(
                "SELECT 1",
                ResultSet::new(vec!["f0_".to_string()], vec![vec![json!(1)]]),
            )
            .with_query_error("SELECT boom", "quota exceeded")
    }

    #[tokio::test]
    async fn lists_the_configured_dataset() {
        let datasets = warehouse().list_datasets().await.unwrap();
        assert_eq!(datasets, vec!["demo".to_string()]);
    }

    #[tokio::test]
    async fn lists_registered_tables() {
        let tables = warehouse().list_tables("demo").await.unwrap();
        assert_eq!(tables, vec!["orders".to_string()]);
    }

    #[tokio::test]
    async fn resolves_qualified_table_ids() {
        let info = warehouse().get_table("demo.orders").await.unwrap();
        assert_eq!(info.row_count, 42);
        assert_eq!(info.schema, vec!["order_id".to_string(), "amount".to_string()]);
    }

    #[tokio::test]
    async fn unknown_dataset_is_a_warehouse_error() {
        let err = warehouse().list_tables("other").await.unwrap_err();
        assert!(matches!(err, RefineError::Warehouse(_)));
    }

    #[tokio::test]
    async fn registered_failure_surfaces_verbatim() {
        let err = warehouse().run_query("SELECT boom", 1).await.unwrap_err();
        assert_eq!(err.surface_message(), "quota exceeded");
    }
}
