//! Request orchestration.
//!
//! ```text
//! query text ─► compile ─► warnings ─► open index ─► execute (+ retry) ─► facets
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use bibquery_compile::{CompileCache, HeuristicCompiler, LlmCompiler, LlmConfig};
use bibquery_index::{
    compute_facets, open_read_only, ExecutionError, Executor, FacetCounts, SqlQuery,
};
use bibquery_plan::{CandidateSet, PlanCompiler, QueryPlan, SubjectHintRetry};

use crate::config::{CompilerBackend, ServiceConfig, DEFAULT_FACET_TOP_N};
use crate::error::ServiceError;
use crate::warnings::{plan_warnings, zero_results_warning, Warning};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub query_text: String,
    pub limit: Option<usize>,
    pub facets: bool,
}

impl QueryRequest {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            limit: None,
            facets: false,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_facets(mut self, facets: bool) -> Self {
        self.facets = facets;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// The plan that was executed (the retried plan if a retry happened).
    pub plan: QueryPlan,
    pub sql: SqlQuery,
    pub candidates: CandidateSet,
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<FacetCounts>,
    pub retried: bool,
    /// Wall-clock time spent executing against the index, facets included.
    pub execution_ms: u64,
}

pub struct QueryService {
    compiler: Arc<dyn PlanCompiler>,
    retry: Option<Arc<dyn SubjectHintRetry>>,
    index_path: PathBuf,
    facet_top_n: usize,
    subject_hints: usize,
}

impl QueryService {
    pub fn new(compiler: Arc<dyn PlanCompiler>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            compiler,
            retry: None,
            index_path: index_path.into(),
            facet_top_n: DEFAULT_FACET_TOP_N,
            subject_hints: bibquery_index::DEFAULT_SUBJECT_HINTS,
        }
    }

    pub fn with_retry(mut self, retry: Arc<dyn SubjectHintRetry>) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_facet_top_n(mut self, top_n: usize) -> Self {
        self.facet_top_n = top_n.max(1);
        self
    }

    pub fn with_subject_hints(mut self, count: usize) -> Self {
        self.subject_hints = count.max(1);
        self
    }

    /// Build the service the configuration describes. The LLM backend reads
    /// its provider settings from the environment and doubles as the retry
    /// hook; the heuristic backend never retries.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let service = match config.compiler {
            CompilerBackend::Heuristic => {
                Self::new(Arc::new(HeuristicCompiler::new()), config.index_path.clone())
            }
            CompilerBackend::Llm => {
                let llm_config = LlmConfig::from_env()?;
                let mut compiler = LlmCompiler::from_config(&llm_config)?;
                if let Some(path) = &config.compile_cache {
                    compiler = compiler.with_cache(Arc::new(CompileCache::open(path)?));
                }
                let compiler = Arc::new(compiler);
                Self::new(compiler.clone(), config.index_path.clone()).with_retry(compiler)
            }
        };
        tracing::debug!(
            backend = service.compiler.backend(),
            index = %config.index_path.display(),
            "query service configured"
        );
        Ok(service
            .with_facet_top_n(config.facet_top_n)
            .with_subject_hints(config.subject_hints))
    }

    pub fn backend(&self) -> &'static str {
        self.compiler.backend()
    }

    pub fn compile(&self, query_text: &str, limit: Option<usize>) -> Result<QueryPlan, ServiceError> {
        let plan = self.compiler.compile(query_text, limit)?;
        tracing::debug!(
            backend = self.compiler.backend(),
            filters = plan.filters.len(),
            "compiled query"
        );
        Ok(plan)
    }

    /// Run an already compiled plan.
    pub fn execute_plan(&self, plan: &QueryPlan, facets: bool) -> Result<QueryResult, ServiceError> {
        let mut warnings = plan_warnings(plan);

        let started = Instant::now();
        let conn = open_read_only(&self.index_path)?;
        let outcome = Executor::new(&conn)
            .with_retry(self.retry.as_deref())
            .with_subject_hint_limit(self.subject_hints)
            .execute(plan)?;
        let facets = if facets {
            let ids: Vec<String> = outcome
                .candidates
                .record_ids()
                .into_iter()
                .map(str::to_string)
                .collect();
            Some(compute_facets(&conn, &ids, self.facet_top_n).map_err(ExecutionError::Facets)?)
        } else {
            None
        };
        let execution_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if outcome.retried {
            warnings = plan_warnings(&outcome.plan);
        }
        if outcome.candidates.is_empty() {
            warnings.push(zero_results_warning());
        }

        tracing::info!(
            query = %outcome.plan.query_text,
            plan_hash = %outcome.candidates.plan_hash,
            results = outcome.candidates.total_count,
            retried = outcome.retried,
            execution_ms,
            "query executed"
        );

        Ok(QueryResult {
            plan: outcome.plan,
            sql: outcome.sql,
            candidates: outcome.candidates,
            warnings,
            facets,
            retried: outcome.retried,
            execution_ms,
        })
    }

    pub fn query(&self, request: &QueryRequest) -> Result<QueryResult, ServiceError> {
        let plan = self.compile(&request.query_text, request.limit)?;
        self.execute_plan(&plan, request.facets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warnings::WarningCode;
    use bibquery_index::fixture::sample_index_at;
    use bibquery_plan::{debug_keys, CompilationError, Filter, FilterField, SubjectHint};
    use parking_lot::Mutex;
    use std::path::Path;

    fn index() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bibliographic.db");
        sample_index_at(&path).unwrap();
        (dir, path)
    }

    fn heuristic(path: &Path) -> QueryService {
        QueryService::new(Arc::new(HeuristicCompiler::new()), path)
    }

    /// Compiles every query to a subject filter the index does not have.
    struct MissSubject;

    impl PlanCompiler for MissSubject {
        fn backend(&self) -> &'static str {
            "test"
        }

        fn compile(&self, query_text: &str, limit: Option<usize>) -> Result<QueryPlan, CompilationError> {
            Ok(QueryPlan::new(query_text)
                .with_filters(vec![Filter::contains(FilterField::Subject, "alchemical").unwrap()])
                .with_limit(limit))
        }
    }

    struct RemapToAlchemy {
        calls: Mutex<usize>,
    }

    impl SubjectHintRetry for RemapToAlchemy {
        fn retry_with_subject_hints(
            &self,
            plan: &QueryPlan,
            _hints: &[SubjectHint],
        ) -> Result<QueryPlan, CompilationError> {
            *self.calls.lock() += 1;
            Ok(plan
                .clone()
                .with_filters(vec![Filter::contains(FilterField::Subject, "alchemy").unwrap()])
                .with_debug(debug_keys::RETRY_ATTEMPT, true))
        }
    }

    #[test]
    fn heuristic_scenario_end_to_end() {
        let (_dir, path) = index();
        let result = heuristic(&path)
            .query(&QueryRequest::new("All books published by X between 1500 and 1599").with_facets(true))
            .unwrap();

        assert_eq!(
            result.candidates.record_ids(),
            vec!["990001", "990002", "990003", "990004"]
        );
        assert!(result.warnings.is_empty());
        assert!(!result.retried);
        let facets = result.facets.unwrap();
        assert_eq!(facets.publisher[0].count, 4);
    }

    #[test]
    fn unrecognized_query_warns_but_still_runs() {
        let (_dir, path) = index();
        let result = heuristic(&path).query(&QueryRequest::new("books")).unwrap();
        assert_eq!(result.warnings[0].code, WarningCode::EmptyFilters);
        assert_eq!(result.candidates.total_count, 6);
        assert!(result.facets.is_none());
    }

    #[test]
    fn zero_results_are_reported() {
        let (_dir, path) = index();
        let result = heuristic(&path)
            .query(&QueryRequest::new("books printed in Lyon"))
            .unwrap();
        assert!(result.candidates.is_empty());
        assert_eq!(result.warnings.last().map(|w| w.code), Some(WarningCode::ZeroResults));
    }

    #[test]
    fn retry_hook_is_used_once() {
        let (_dir, path) = index();
        let hook = Arc::new(RemapToAlchemy { calls: Mutex::new(0) });
        let service = QueryService::new(Arc::new(MissSubject), path).with_retry(hook.clone());

        let result = service.query(&QueryRequest::new("alchemical books")).unwrap();
        assert!(result.retried);
        assert!(result.plan.retry_attempt());
        assert_eq!(result.candidates.total_count, 3);
        assert_eq!(*hook.calls.lock(), 1);
    }

    #[test]
    fn missing_index_is_an_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = heuristic(&dir.path().join("absent.db"));
        let err = service.query(&QueryRequest::new("books")).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Execution(ExecutionError::IndexNotFound(_))
        ));
    }
}
