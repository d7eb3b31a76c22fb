//! Refinement - one typed unit of evidence gathered during a user turn.
//!
//! The chain appends one refinement per tool-calling model turn. The two
//! cross-cutting operations (tool availability and context rendering) match
//! exhaustively over the variants, so adding a refinement kind is a single
//! enumerable edit.

use crate::resultset::ResultSet;
use crate::tools;
use crate::warehouse::DatasetSummary;
use serde::{Deserialize, Serialize};

/// Chart produced from an antecedent table. The table itself is not copied;
/// the spec references it by column names only, so refinements never point
/// at each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub xaxis: String,
    pub yaxis: String,
    pub source_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Refinement {
    Error { message: String },
    DatabaseInfo(DatasetSummary),
    Table(ResultSet),
    Graph(ChartSpec),
}

impl Refinement {
    /// Tools legal on the next turn, determined by this variant alone.
    pub fn available_tools(&self) -> &'static [&'static str] {
        match self {
            Refinement::Error { .. } => &[],
            Refinement::DatabaseInfo(_) => &[tools::RUN_SQL],
            Refinement::Table(_) => &[tools::RENDER_CHART],
            Refinement::Graph(_) => &[],
        }
    }

    /// Whether this refinement is solely an intermediate step. Intermediate
    /// refinements are buried under an "extended reasoning" disclosure by
    /// presentation layers; the others may stand as the visible artifact.
    pub fn is_intermediate_only(&self) -> bool {
        matches!(self, Refinement::Error { .. } | Refinement::DatabaseInfo(_))
    }

    /// Side-effect-free description for the interactive log.
    pub fn render(&self) -> String {
        match self {
            Refinement::Error { message } => message.clone(),
            Refinement::DatabaseInfo(summary) => {
                let names: Vec<&str> =
                    summary.tables.iter().map(|t| t.table_id.as_str()).collect();
                format!(
                    "Dataset '{}' with tables: {}",
                    summary.dataset_id,
                    names.join(", ")
                )
            }
            Refinement::Table(result) => result.render_text(),
            Refinement::Graph(spec) => format!("Bar chart of {} by {}", spec.yaxis, spec.xaxis),
        }
    }

    /// Prompt-ready serialization of this refinement's payload.
    pub fn as_context(&self) -> String {
        match self {
            Refinement::Error { message } => {
                format!("Received the following error:\n{message}")
            }
            Refinement::DatabaseInfo(summary) => {
                let mut context = format!(
                    "You have access to the following database structure:\n\nDataset: {}\nTables:\n",
                    summary.dataset_id
                );
                for table in &summary.tables {
                    context.push_str(&format!(
                        "\n- {}:\n  Description: {}\n  Columns: {}\n  Row count: {}\n",
                        table.table_id,
                        table.description.as_deref().unwrap_or(""),
                        table.schema.join(", "),
                        table.row_count
                    ));
                }
                context
            }
            Refinement::Table(result) => {
                format!(
                    "This table was generated during context refinement:\n\n{}",
                    result.render_text()
                )
            }
            Refinement::Graph(_) => {
                "A bar chart was generated from the previous table. \
                 Complete the answer to the user's question."
                    .to_string()
            }
        }
    }
}
