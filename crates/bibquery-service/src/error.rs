use thiserror::Error;

use bibquery_compile::{CacheError, ConfigError};
use bibquery_index::ExecutionError;
use bibquery_plan::CompilationError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("compile cache unavailable: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error(transparent)]
    Execution(ExecutionError),

    /// A plan the adapter cannot translate. Never the user's fault.
    #[error("internal error: {detail}")]
    Internal { detail: String },
}

impl From<ExecutionError> for ServiceError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Build(e) => {
                tracing::error!(error = %e, "adapter rejected a compiled plan");
                Self::Internal {
                    detail: e.to_string(),
                }
            }
            other => Self::Execution(other),
        }
    }
}

impl ServiceError {
    /// Text suitable for showing to the person who asked the question.
    pub fn user_message(&self) -> String {
        match self {
            Self::Compilation(e) => e.explain(),
            Self::Execution(ExecutionError::IndexNotFound(path)) => format!(
                "The bibliographic index was not found at {}. Set BIBQUERY_INDEX_PATH to the index file.",
                path.display()
            ),
            Self::Execution(e) => format!("The index query failed: {e}"),
            Self::Config(e) => format!("Configuration problem: {e}"),
            Self::Cache(e) => format!("The compile cache could not be used: {e}"),
            Self::Internal { .. } => {
                "Something went wrong on our side while running this query. It has been logged.".to_string()
            }
        }
    }
}
