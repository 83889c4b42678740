use std::path::PathBuf;

use thiserror::Error;

use crate::adapter::SqlBuildError;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("index not found at `{0}`")]
    IndexNotFound(PathBuf),

    #[error("failed to open index `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The adapter rejected the plan. A programming error.
    #[error(transparent)]
    Build(#[from] SqlBuildError),

    #[error("index query failed: {source} (sql: {sql}; params: {params})")]
    Query {
        sql: String,
        params: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("facet aggregation failed: {0}")]
    Facets(#[source] rusqlite::Error),

    #[error("failed to hash plan: {0}")]
    Hash(#[from] serde_json::Error),
}
