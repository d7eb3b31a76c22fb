//! Terminal chat loop over the refinement engine.
//!
//! Presentation glue only: reads questions from stdin, runs one turn at a
//! time, and prints the answer plus the turn's refinement trail.

use anyhow::{Context, Result};
use clap::Parser;
use refine_engine::{
    tool_declarations, ConversationDriver, LlmClient, MemoryWarehouse, Refinement, ResultSet,
    RestWarehouse, ToolExecutor, Warehouse,
};
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "assistant", about = "Ask natural-language questions against a dataset")]
struct Args {
    /// Dataset id to introspect and query
    #[arg(long, default_value = "demo")]
    dataset: String,

    /// Warehouse statement API URL; without it a built-in demo dataset is used
    #[arg(long)]
    warehouse_url: Option<String>,

    /// Warehouse user name
    #[arg(long, default_value = "assistant")]
    warehouse_user: String,
}

fn demo_warehouse() -> MemoryWarehouse {
    MemoryWarehouse::new("demo")
        .with_table(
            "orders",
            Some("one row per customer order"),
            &["order_id", "region", "amount"],
            4,
        )
        .with_query_result(
            "SELECT region, SUM(amount) AS total FROM demo.orders GROUP BY region",
            ResultSet::new(
                vec!["region".to_string(), "total".to_string()],
                vec![
                    vec![json!("north"), json!(1250.0)],
                    vec![json!("south"), json!(980.5)],
                ],
            ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let warehouse: Arc<dyn Warehouse> = match &args.warehouse_url {
        Some(url) => Arc::new(RestWarehouse::new(url.clone(), args.warehouse_user.clone())?),
        None => Arc::new(demo_warehouse()),
    };
    let executor = ToolExecutor::new(warehouse);

    let client = LlmClient::from_env(tool_declarations())
        .context("model configuration (OPENAI_API_KEY, LLM_BASE_URL, LLM_MODEL)")?;
    let mut driver = ConversationDriver::new(client.start_chat(), executor, args.dataset);

    println!("Ask me about information in the database (empty line to quit).");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let prompt = line.trim();
        if prompt.is_empty() {
            break;
        }

        let answer = driver.run_turn(prompt).await?;

        if let Some(history) = driver
            .transcript()
            .last()
            .and_then(|m| m.refinements.as_deref())
        {
            let visible_tail = history
                .last()
                .map(|r| !r.is_intermediate_only())
                .unwrap_or(false);
            let reasoning: &[Refinement] = if visible_tail {
                &history[..history.len() - 1]
            } else {
                history
            };
            for refinement in reasoning {
                println!("  [reasoning] {}", refinement.render());
            }
            println!("{answer}");
            if visible_tail {
                if let Some(last) = history.last() {
                    println!("{}", last.render());
                }
            }
        } else {
            println!("{answer}");
        }
    }

    Ok(())
}
