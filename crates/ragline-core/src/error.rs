//! Error types for ragline

use thiserror::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the ragline query engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Node group already exists: {0}")]
    DuplicateGroup(String),

    #[error("Unknown parent group '{parent}' for node group '{group}'")]
    UnknownParent { group: String, parent: String },

    #[error("Unknown node group: {0}")]
    UnknownGroup(String),

    #[error("Retrieval error in {retriever}: {message}")]
    Retrieval { retriever: String, message: String },

    #[error("Node {node_id} has no counterpart in target group '{target}'")]
    UnresolvedTarget { node_id: String, target: String },

    #[error("Unbound reference '{reference}' for parameter '{param}'")]
    UnboundReference { param: String, reference: String },

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a retrieval failure attributed to a named retriever
    pub fn retrieval(retriever: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Retrieval {
            retriever: retriever.into(),
            message: message.into(),
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// Configuration and wiring mistakes are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Retrieval { .. }
                | Error::Network(_)
                | Error::Timeout(_)
                | Error::Transform(_)
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
