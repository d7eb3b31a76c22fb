//! Warehouse Module - External data-warehouse collaborator
//!
//! The core only depends on the `Warehouse` trait; implementations cover a
//! statement-style REST API and an in-process fixture warehouse.

use crate::error::Result;
use crate::resultset::ResultSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod rest;

pub use memory::MemoryWarehouse;
pub use rest::RestWarehouse;

/// Introspected description of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub table_id: String,
    pub description: Option<String>,
    /// Column names, in schema order
    pub schema: Vec<String>,
    pub row_count: u64,
}

/// Aggregate introspection result for a dataset, consumed by the
/// database-info refinement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub dataset_id: String,
    pub tables: Vec<TableInfo>,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// List the dataset ids this warehouse serves.
    async fn list_datasets(&self) -> Result<Vec<String>>;

    /// List table ids in a dataset.
    async fn list_tables(&self, dataset_id: &str) -> Result<Vec<String>>;

    /// Fetch description, column names and row count for one table.
    /// `table_id` is fully qualified ("dataset.table").
    async fn get_table(&self, table_id: &str) -> Result<TableInfo>;

    /// Run a SQL query with a hard byte-scan ceiling. Provider failures come
    /// back as `RefineError::Query` with the provider message verbatim.
    async fn run_query(&self, sql: &str, max_bytes_billed: u64) -> Result<ResultSet>;
}
