//! Compiler interfaces.
//!
//! Both backends (heuristic, LLM-assisted) implement [`PlanCompiler`]. Only
//! the LLM-assisted backend implements [`SubjectHintRetry`]; the executor
//! takes the retry hook separately so the common interface stays small.

use serde::{Deserialize, Serialize};

use crate::error::CompilationError;
use crate::plan::QueryPlan;

pub trait PlanCompiler: Send + Sync {
    /// Short backend name recorded in `debug.backend`.
    fn backend(&self) -> &'static str;

    fn compile(&self, query_text: &str, limit: Option<usize>) -> Result<QueryPlan, CompilationError>;
}

/// A controlled-vocabulary subject value and how many records carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectHint {
    pub value: String,
    pub count: u64,
}

pub trait SubjectHintRetry: Send + Sync {
    /// Recompile `plan` (which returned zero rows) with the index's most
    /// frequent subject values as hints. Returns a new plan with
    /// `debug.retry_attempt = true`; never mutates `plan`.
    fn retry_with_subject_hints(
        &self,
        plan: &QueryPlan,
        hints: &[SubjectHint],
    ) -> Result<QueryPlan, CompilationError>;
}
