//! bibquery service: the one component that knows every stage.
//!
//! [`QueryService`] compiles a question with the configured backend, attaches
//! advisory [`Warning`]s, executes the plan against a fresh read-only index
//! connection (with the subject-hint retry when the backend supports it) and
//! optionally aggregates facets over the result set.
//!
//! The service holds no mutable state of its own; it is `Send + Sync` and can
//! be shared behind an `Arc`.

pub mod config;
pub mod error;
pub mod service;
pub mod warnings;

pub use config::{CompilerBackend, ServiceConfig};
pub use error::ServiceError;
pub use service::{QueryRequest, QueryResult, QueryService};
pub use warnings::{plan_warnings, Warning, WarningCode};
