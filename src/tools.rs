//! Tool Catalog
//!
//! Declares the function schemas the model is allowed to call, in the
//! OpenAI function-calling shape. The catalog is fixed data; which of these
//! tools is legal on a given turn is decided by the refinement chain, not
//! here.

use serde::{Deserialize, Serialize};
use serde_json::json;

pub const RUN_SQL: &str = "run_sql";
pub const RENDER_CHART: &str = "render_chart";

/// Function definition passed to the model at construction time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Function call returned by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String, // JSON string
}

/// Message in OpenAI chat format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant", "function"
    pub content: Option<String>,
    pub function_call: Option<FunctionCall>,
    pub name: Option<String>, // For function role
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            function_call: None,
            name: None,
        }
    }

    pub fn assistant(content: Option<String>, function_call: Option<FunctionCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            function_call,
            name: None,
        }
    }
}

pub fn run_sql_function() -> FunctionDefinition {
    FunctionDefinition {
        name: RUN_SQL.to_string(),
        description: "Get information from data in the warehouse using SQL queries".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "SQL query that will help give quantitative answers to the user's question. Always use fully qualified dataset and table names."
                }
            },
            "required": ["query"]
        }),
    }
}

pub fn render_chart_function() -> FunctionDefinition {
    FunctionDefinition {
        name: RENDER_CHART.to_string(),
        description: "Generate a bar chart from the header names of the provided table context"
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "xaxis": {
                    "type": "string",
                    "description": "Label of the x-axis from the table provided in the context."
                },
                "yaxis": {
                    "type": "string",
                    "description": "Label of the y-axis from the table provided in the context. Must be numeric."
                }
            },
            "required": ["xaxis", "yaxis"]
        }),
    }
}

/// The full, immutable set of model-invocable tools.
pub fn tool_declarations() -> Vec<FunctionDefinition> {
    vec![run_sql_function(), render_chart_function()]
}
