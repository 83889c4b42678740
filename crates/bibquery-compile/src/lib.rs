//! bibquery compilers: free text → [`bibquery_plan::QueryPlan`].
//!
//! Two backends implement [`bibquery_plan::PlanCompiler`]:
//! - [`HeuristicCompiler`]: deterministic named regex patterns, never fails.
//! - [`LlmCompiler`]: schema-constrained calls to an external model, with a
//!   compile cache and the subject-hint retry hook.

pub mod cache;
pub mod env;
pub mod heuristic;
pub mod languages;
pub mod llm;

pub use cache::{CacheEntry, CacheError, CompileCache};
pub use env::ConfigError;
pub use heuristic::HeuristicCompiler;
pub use llm::providers::{LlmConfig, LlmProvider, LlmRequest, ProviderKind};
pub use llm::LlmCompiler;
