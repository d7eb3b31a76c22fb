//! Tool Executor - performs the side-effecting work behind each tool name.
//!
//! The executor talks to the warehouse collaborator; it never lets errors
//! escape to the driver. The chain converts every failure into a terminal
//! error refinement.

use crate::error::{RefineError, Result};
use crate::refinement::{ChartSpec, Refinement};
use crate::resultset::ResultSet;
use crate::warehouse::{DatasetSummary, Warehouse};
use std::sync::Arc;
use tracing::info;

/// Hard ceiling on bytes a single query may scan.
pub const MAX_BYTES_BILLED: u64 = 100_000_000_000_000;

pub struct ToolExecutor {
    warehouse: Arc<dyn Warehouse>,
    max_bytes_billed: u64,
}

impl ToolExecutor {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            warehouse,
            max_bytes_billed: MAX_BYTES_BILLED,
        }
    }

    pub fn with_max_bytes_billed(mut self, limit: u64) -> Self {
        self.max_bytes_billed = limit;
        self
    }

    /// List the dataset's tables and fetch description, columns and row
    /// count for each. Runs once per chain, at creation; not reachable as a
    /// model-invocable tool.
    pub async fn introspect_database(&self, dataset_id: &str) -> Result<DatasetSummary> {
        let mut tables = Vec::new();
        for table_id in self.warehouse.list_tables(dataset_id).await? {
            let qualified = format!("{dataset_id}.{table_id}");
            tables.push(self.warehouse.get_table(&qualified).await?);
        }
        info!(dataset_id, table_count = tables.len(), "introspected dataset");
        Ok(DatasetSummary {
            dataset_id: dataset_id.to_string(),
            tables,
        })
    }

    /// Submit a query, normalizing escape noise the model tends to emit.
    pub async fn run_sql(&self, query: &str) -> Result<ResultSet> {
        let cleaned = clean_query(query);
        info!(query = %cleaned, "running SQL refinement");
        self.warehouse
            .run_query(&cleaned, self.max_bytes_billed)
            .await
    }

    /// Build a chart spec over the immediately preceding refinement, which
    /// must be a table. The table data is referenced by column names, not
    /// copied.
    pub fn render_chart(
        &self,
        last_refinement: &Refinement,
        xaxis: &str,
        yaxis: &str,
    ) -> Result<ChartSpec> {
        match last_refinement {
            Refinement::Table(result) => Ok(ChartSpec {
                xaxis: xaxis.to_string(),
                yaxis: yaxis.to_string(),
                source_columns: result.columns.clone(),
            }),
            _ => Err(RefineError::Precondition(
                "Can only generate a chart when the previous refinement is a table".to_string(),
            )),
        }
    }
}

/// Strip literal escape sequences and raw line breaks from model-generated
/// SQL before submission.
fn clean_query(query: &str) -> String {
    query
        .replace("\\n", " ")
        .replace('\n', "")
        .replace('\\', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MemoryWarehouse;
    use serde_json::json;

    fn executor() -> ToolExecutor {
        let warehouse = MemoryWarehouse::new("demo")
            .with_table("T", Some("fixture"), &["a", "b"], 10)
            .with_query_result(
                "SELECT a FROM demo.T",
                ResultSet::new(vec!["a".to_string()], vec![vec![json!(1)]]),
            );
        ToolExecutor::new(Arc::new(warehouse))
    }

    #[test]
    fn clean_query_strips_escape_noise() {
        assert_eq!(clean_query("SELECT\\na FROM t"), "SELECT a FROM t");
        assert_eq!(clean_query("SELECT a\nFROM t"), "SELECT aFROM t");
        assert_eq!(clean_query("SELECT \\\"a\\\" FROM t"), "SELECT \"a\" FROM t");
    }

    #[tokio::test]
    async fn introspection_aggregates_table_details() {
        let summary = executor().introspect_database("demo").await.unwrap();
        assert_eq!(summary.dataset_id, "demo");
        assert_eq!(summary.tables.len(), 1);
        assert_eq!(summary.tables[0].table_id, "T");
        assert_eq!(summary.tables[0].row_count, 10);
    }

    #[tokio::test]
    async fn run_sql_normalizes_before_submission() {
        // The registered statement has no escapes; the noisy form must still hit it.
        let result = executor().run_sql("SELECT a FROM demo.T").await.unwrap();
        assert_eq!(result.columns, vec!["a".to_string()]);
    }

    #[test]
    fn chart_requires_an_antecedent_table() {
        let err = executor()
            .render_chart(
                &Refinement::Error { message: "x".to_string() },
                "a",
                "b",
            )
            .unwrap_err();
        assert!(matches!(err, RefineError::Precondition(_)));
    }

    #[test]
    fn chart_references_source_columns_without_copying_rows() {
        let table = Refinement::Table(ResultSet::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![json!(1), json!(2)]],
        ));
        let spec = executor().render_chart(&table, "a", "b").unwrap();
        assert_eq!(spec.source_columns, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(spec.xaxis, "a");
        assert_eq!(spec.yaxis, "b");
    }
}
