//! refine-engine - context-refinement orchestration for data questions.
//!
//! An LLM equipped with callable tools (run SQL, render a chart) iteratively
//! gathers typed evidence ("refinements") against an analytical dataset and
//! produces a grounded natural-language answer. The crate owns the
//! refinement chain state machine, the tool catalog and executor, and the
//! per-session conversation driver; the warehouse and the model are
//! consumed behind traits.

pub mod chain;
pub mod driver;
pub mod error;
pub mod executor;
pub mod model;
pub mod refinement;
pub mod resultset;
pub mod tools;
pub mod warehouse;

pub use chain::{ChainState, RefinementChain, DEFAULT_RESPONSE};
pub use driver::{ConversationDriver, Role, TranscriptMessage, MAX_CONTEXT_SIZE};
pub use error::{RefineError, Result};
pub use executor::{ToolExecutor, MAX_BYTES_BILLED};
pub use model::{ChatModel, ChatSession, LlmClient, ModelReply};
pub use refinement::{ChartSpec, Refinement};
pub use resultset::ResultSet;
pub use tools::{tool_declarations, FunctionCall, FunctionDefinition};
pub use warehouse::{DatasetSummary, MemoryWarehouse, RestWarehouse, TableInfo, Warehouse};
