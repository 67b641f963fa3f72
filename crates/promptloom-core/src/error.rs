use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoomError {
    // Structural errors — abort the run
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unsupported node type: {0}")]
    UnsupportedNodeType(String),

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("Unsupported transformation: {0}")]
    UnsupportedTransform(String),

    #[error("Incomplete node configuration: {0}")]
    ConfigIncomplete(String),

    // Provider / external errors
    #[error("AI service error: {0}")]
    Provider(String),

    #[error("API call error: {0}")]
    Http(String),

    // Condition evaluation errors
    #[error("Condition evaluation error: {0}")]
    Evaluation(String),

    // Recorded per-node, never propagated out of the executor
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    // Collaborator errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LoomError>;
