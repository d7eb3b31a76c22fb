//! Refinement Chain - the orchestrator state machine for one user turn.
//!
//! Owns the ordered refinement sequence, decides which tool is legal next
//! from the last refinement alone, dispatches tool calls to the executor,
//! and renders chain-local context for the model. Every failure is converted
//! into a terminal error refinement at dispatch time; nothing propagates to
//! the driver.

use crate::error::RefineError;
use crate::executor::ToolExecutor;
use crate::refinement::Refinement;
use crate::tools;
use serde_json::Value;
use tracing::{info, warn};

/// Answer shown if the model stops without ever producing final text.
pub const DEFAULT_RESPONSE: &str = "I retrieved the following from the warehouse.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Accepting further tool calls
    Active,
    /// An error refinement was appended; no further dispatch succeeds
    Terminated,
}

pub struct RefinementChain {
    refinements: Vec<Refinement>,
    state: ChainState,
    response: String,
}

impl RefinementChain {
    /// Create a chain for a new user turn. Introspects the dataset through
    /// the executor and seeds the chain with the database-info refinement,
    /// so the model has ground-truth schema before any tool call.
    pub async fn create(
        executor: &ToolExecutor,
        dataset_id: &str,
    ) -> crate::error::Result<Self> {
        let summary = executor.introspect_database(dataset_id).await?;
        Ok(Self {
            refinements: vec![Refinement::DatabaseInfo(summary)],
            state: ChainState::Active,
            response: DEFAULT_RESPONSE.to_string(),
        })
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ChainState::Terminated
    }

    /// Tools legal for the next model turn, a pure function of the last
    /// refinement's variant. Empty for error and graph refinements.
    pub fn available_tools(&self) -> &'static [&'static str] {
        self.last_refinement().available_tools()
    }

    fn tool_available(&self, name: &str) -> bool {
        self.available_tools().iter().any(|t| *t == name)
    }

    /// Whether the chain still accepts tool calls.
    pub fn continue_refining(&self) -> bool {
        self.state == ChainState::Active && !self.available_tools().is_empty()
    }

    /// Read-only view of the refinement sequence, for persistence and
    /// rendering.
    pub fn history(&self) -> &[Refinement] {
        &self.refinements
    }

    /// Freeze the chain into its refinement sequence once the turn is over.
    pub fn into_history(self) -> Vec<Refinement> {
        self.refinements
    }

    pub fn last_refinement(&self) -> &Refinement {
        // A chain is always seeded with the database refinement and nothing
        // is ever removed.
        self.refinements
            .last()
            .expect("chain holds at least the seed refinement")
    }

    pub fn set_final_answer(&mut self, text: impl Into<String>) {
        self.response = text.into();
    }

    pub fn final_answer(&self) -> &str {
        &self.response
    }

    /// Context sent to the model each turn: a fixed instructional preamble
    /// around the last refinement only. Prompt growth stays O(1) per turn
    /// regardless of chain length.
    pub fn local_context(&self) -> String {
        format!(
            "This is some context that has been refined over iterations:\n{}\n\n\
             Answer the above prompt given the context.\n",
            self.last_refinement().as_context()
        )
    }

    /// Execute one model-requested tool call and append the outcome as a new
    /// refinement. Unknown or currently-disallowed tool names fail closed
    /// into a terminal error refinement; executor failures carry the
    /// provider message.
    pub async fn dispatch(
        &mut self,
        executor: &ToolExecutor,
        name: &str,
        args: &serde_json::Map<String, Value>,
    ) -> &Refinement {
        let refinement = match name {
            tools::RUN_SQL if self.tool_available(tools::RUN_SQL) => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or("");
                match executor.run_sql(query).await {
                    Ok(result) => {
                        info!(rows = result.row_count(), "SQL refinement succeeded");
                        Refinement::Table(result)
                    }
                    Err(e) => self.terminate_with_error(e),
                }
            }
            tools::RENDER_CHART => {
                // Chart legality coincides with the executor precondition:
                // the last refinement must be a table.
                let xaxis = args.get("xaxis").and_then(Value::as_str).unwrap_or("");
                let yaxis = args.get("yaxis").and_then(Value::as_str).unwrap_or("");
                match executor.render_chart(self.last_refinement(), xaxis, yaxis) {
                    Ok(spec) => Refinement::Graph(spec),
                    Err(e) => self.terminate_with_error(e),
                }
            }
            other => {
                warn!(tool = other, "disallowed or unknown tool call");
                self.terminate_with_error(RefineError::ToolDispatch(
                    "A valid function call was not generated".to_string(),
                ))
            }
        };
        self.refinements.push(refinement);
        self.last_refinement()
    }

    fn terminate_with_error(&mut self, error: RefineError) -> Refinement {
        self.state = ChainState::Terminated;
        Refinement::Error {
            message: error.surface_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resultset::ResultSet;
    use crate::warehouse::MemoryWarehouse;
    use serde_json::json;
    use std::sync::Arc;

    fn sql_args(query: &str) -> serde_json::Map<String, Value> {
        let mut args = serde_json::Map::new();
        args.insert("query".to_string(), json!(query));
        args
    }

    fn chart_args(xaxis: &str, yaxis: &str) -> serde_json::Map<String, Value> {
        let mut args = serde_json::Map::new();
        args.insert("xaxis".to_string(), json!(xaxis));
        args.insert("yaxis".to_string(), json!(yaxis));
        args
    }

    fn executor() -> ToolExecutor {
        let warehouse = MemoryWarehouse::new("demo")
            .with_table("T", Some("fixture table"), &["a", "b"], 10)
            .with_query_result(
                "SELECT 1",
                ResultSet::new(vec!["f0_".to_string()], vec![vec![json!(1)]]),
            )
            .with_query_error("SELECT boom", "quota exceeded");
        ToolExecutor::new(Arc::new(warehouse))
    }

    #[tokio::test]
    async fn chain_starts_with_database_info() {
        let executor = executor();
        let chain = RefinementChain::create(&executor, "demo").await.unwrap();
        assert!(matches!(chain.history()[0], Refinement::DatabaseInfo(_)));
        assert_eq!(chain.available_tools(), &[tools::RUN_SQL]);
        assert!(chain.continue_refining());
    }

    #[tokio::test]
    async fn seed_context_embeds_schema_details() {
        let executor = executor();
        let chain = RefinementChain::create(&executor, "demo").await.unwrap();
        let context = chain.history()[0].as_context();
        for needle in ["T", "a", "b", "10"] {
            assert!(context.contains(needle), "missing {needle}");
        }
    }

    #[tokio::test]
    async fn run_sql_appends_a_table_and_offers_chart() {
        let executor = executor();
        let mut chain = RefinementChain::create(&executor, "demo").await.unwrap();
        let appended = chain
            .dispatch(&executor, tools::RUN_SQL, &sql_args("SELECT 1"))
            .await;
        assert!(matches!(appended, Refinement::Table(_)));
        assert_eq!(chain.available_tools(), &[tools::RENDER_CHART]);
        assert_eq!(chain.history().len(), 2);
    }

    #[tokio::test]
    async fn chart_before_any_table_fails_closed() {
        let executor = executor();
        let mut chain = RefinementChain::create(&executor, "demo").await.unwrap();
        let appended = chain
            .dispatch(&executor, tools::RENDER_CHART, &chart_args("a", "b"))
            .await;
        match appended {
            Refinement::Error { message } => assert!(message.contains("table")),
            other => panic!("expected error refinement, got {other:?}"),
        }
        assert!(chain.available_tools().is_empty());
        assert!(chain.is_terminated());
    }

    #[tokio::test]
    async fn query_failure_carries_the_provider_message() {
        let executor = executor();
        let mut chain = RefinementChain::create(&executor, "demo").await.unwrap();
        chain
            .dispatch(&executor, tools::RUN_SQL, &sql_args("SELECT boom"))
            .await;
        assert!(chain.is_terminated());
        assert!(chain
            .last_refinement()
            .as_context()
            .contains("quota exceeded"));
    }

    #[tokio::test]
    async fn unknown_tool_name_fails_closed() {
        let executor = executor();
        let mut chain = RefinementChain::create(&executor, "demo").await.unwrap();
        let appended = chain
            .dispatch(&executor, "drop_tables", &serde_json::Map::new())
            .await;
        assert_eq!(
            appended,
            &Refinement::Error {
                message: "A valid function call was not generated".to_string()
            }
        );
        assert!(chain.is_terminated());
    }

    #[tokio::test]
    async fn dispatch_after_termination_yields_another_error() {
        let executor = executor();
        let mut chain = RefinementChain::create(&executor, "demo").await.unwrap();
        chain
            .dispatch(&executor, tools::RUN_SQL, &sql_args("SELECT boom"))
            .await;
        assert!(chain.available_tools().is_empty());

        let appended = chain
            .dispatch(&executor, tools::RUN_SQL, &sql_args("SELECT 1"))
            .await;
        assert!(matches!(appended, Refinement::Error { .. }));
        assert!(chain.available_tools().is_empty());
        assert!(chain.is_terminated());
    }

    #[tokio::test]
    async fn graph_refinement_empties_availability_without_error() {
        let executor = executor();
        let mut chain = RefinementChain::create(&executor, "demo").await.unwrap();
        chain
            .dispatch(&executor, tools::RUN_SQL, &sql_args("SELECT 1"))
            .await;
        let appended = chain
            .dispatch(&executor, tools::RENDER_CHART, &chart_args("f0_", "f0_"))
            .await;
        assert!(matches!(appended, Refinement::Graph(_)));
        assert!(chain.available_tools().is_empty());
        assert!(!chain.is_terminated());
        assert!(!chain.continue_refining());
    }

    #[tokio::test]
    async fn run_sql_after_a_graph_yields_an_error_refinement() {
        let executor = executor();
        let mut chain = RefinementChain::create(&executor, "demo").await.unwrap();
        chain
            .dispatch(&executor, tools::RUN_SQL, &sql_args("SELECT 1"))
            .await;
        chain
            .dispatch(&executor, tools::RENDER_CHART, &chart_args("f0_", "f0_"))
            .await;

        let appended = chain
            .dispatch(&executor, tools::RUN_SQL, &sql_args("SELECT 1"))
            .await;
        assert_eq!(
            appended,
            &Refinement::Error {
                message: "A valid function call was not generated".to_string()
            }
        );
        assert!(chain.is_terminated());
        assert!(chain.available_tools().is_empty());
    }

    #[tokio::test]
    async fn render_chart_after_a_graph_yields_an_error_refinement() {
        let executor = executor();
        let mut chain = RefinementChain::create(&executor, "demo").await.unwrap();
        chain
            .dispatch(&executor, tools::RUN_SQL, &sql_args("SELECT 1"))
            .await;
        chain
            .dispatch(&executor, tools::RENDER_CHART, &chart_args("f0_", "f0_"))
            .await;

        // A second chart has no antecedent table; the graph is last.
        let appended = chain
            .dispatch(&executor, tools::RENDER_CHART, &chart_args("f0_", "f0_"))
            .await;
        match appended {
            Refinement::Error { message } => assert!(message.contains("table")),
            other => panic!("expected error refinement, got {other:?}"),
        }
        assert!(chain.is_terminated());
        assert!(chain.available_tools().is_empty());
    }

    #[tokio::test]
    async fn local_context_depends_only_on_the_last_refinement() {
        let executor = executor();
        let mut long_chain = RefinementChain::create(&executor, "demo").await.unwrap();
        long_chain
            .dispatch(&executor, tools::RUN_SQL, &sql_args("SELECT 1"))
            .await;

        // A second chain whose last refinement is structurally equal.
        let mut short_chain = RefinementChain::create(&executor, "demo").await.unwrap();
        short_chain
            .dispatch(&executor, tools::RUN_SQL, &sql_args("SELECT 1"))
            .await;

        assert_eq!(long_chain.local_context(), short_chain.local_context());
        assert!(long_chain
            .local_context()
            .starts_with("This is some context that has been refined over iterations:"));
    }

    #[tokio::test]
    async fn final_answer_defaults_until_set() {
        let executor = executor();
        let mut chain = RefinementChain::create(&executor, "demo").await.unwrap();
        assert_eq!(chain.final_answer(), DEFAULT_RESPONSE);
        chain.set_final_answer("There are 10 rows in T.");
        assert_eq!(chain.final_answer(), "There are 10 rows in T.");
    }
}
