use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefineError {
    #[error("Tool dispatch error: {0}")]
    ToolDispatch(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Precondition error: {0}")]
    Precondition(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Warehouse error: {0}")]
    Warehouse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RefineError {
    /// Text that flows into an error refinement and from there into the
    /// model context and the user transcript. Provider-originated failures
    /// keep their message verbatim.
    pub fn surface_message(&self) -> String {
        match self {
            RefineError::ToolDispatch(m)
            | RefineError::Query(m)
            | RefineError::Precondition(m)
            | RefineError::Model(m)
            | RefineError::Warehouse(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RefineError>;
