//! Plan execution against a live index connection.

use chrono::Utc;
use rusqlite::Connection;

use bibquery_plan::{
    plan_hash, Candidate, CandidateSet, FilterField, QueryPlan, SubjectHintRetry,
};

use crate::adapter::{build_sql, SqlQuery};
use crate::error::ExecutionError;
use crate::evidence::{build_rationale, extract_evidence, read_row, RowValues};
use crate::vocabulary::top_subject_hints;

pub const DEFAULT_SUBJECT_HINTS: usize = 100;

/// What was actually run: the plan (the retried one if a retry happened), its
/// SQL and the evidenced candidates.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub plan: QueryPlan,
    pub sql: SqlQuery,
    pub candidates: CandidateSet,
    pub retried: bool,
}

pub struct Executor<'a> {
    conn: &'a Connection,
    retry: Option<&'a dyn SubjectHintRetry>,
    subject_hint_limit: usize,
}

impl<'a> Executor<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            retry: None,
            subject_hint_limit: DEFAULT_SUBJECT_HINTS,
        }
    }

    /// Install the zero-result subject-hint retry hook.
    pub fn with_retry(mut self, retry: Option<&'a dyn SubjectHintRetry>) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_subject_hint_limit(mut self, limit: usize) -> Self {
        self.subject_hint_limit = limit.max(1);
        self
    }

    pub fn execute(&self, plan: &QueryPlan) -> Result<ExecutionOutcome, ExecutionError> {
        let sql = build_sql(plan).inspect_err(|e| {
            tracing::error!(error = %e, query = %plan.query_text, "plan has no SQL translation");
        })?;
        let rows = self.run(&sql)?;

        if rows.is_empty() && qualifies_for_retry(plan) {
            if let Some(retry) = self.retry {
                if let Some((retried_plan, retried_sql, retried_rows)) = self.retry_once(retry, plan) {
                    return self.outcome(retried_plan, retried_sql, retried_rows, true);
                }
            }
        }
        self.outcome(plan.clone(), sql, rows, false)
    }

    fn run(&self, query: &SqlQuery) -> Result<Vec<RowValues>, ExecutionError> {
        let query_error = |source: rusqlite::Error| ExecutionError::Query {
            sql: query.sql.clone(),
            params: query.params_display(),
            source,
        };

        let mut stmt = self.conn.prepare(&query.sql).map_err(query_error)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let rows = stmt
            .query_map(query.named_params().as_slice(), |row| read_row(row, &names))
            .map_err(query_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_error)?;

        tracing::debug!(rows = rows.len(), params = %query.params_display(), "executed plan SQL");
        Ok(rows)
    }

    /// One retry cycle. Any failure is logged and yields `None`, leaving the
    /// original zero-result outcome in place.
    fn retry_once(
        &self,
        retry: &dyn SubjectHintRetry,
        plan: &QueryPlan,
    ) -> Option<(QueryPlan, SqlQuery, Vec<RowValues>)> {
        let hints = match top_subject_hints(self.conn, self.subject_hint_limit) {
            Ok(hints) => hints,
            Err(e) => {
                tracing::warn!(error = %e, "subject hint lookup failed; keeping zero-result set");
                return None;
            }
        };
        let retried = match retry.retry_with_subject_hints(plan, &hints) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(error = %e, "subject-hint retry failed; keeping zero-result set");
                return None;
            }
        };
        let sql = match build_sql(&retried) {
            Ok(sql) => sql,
            Err(e) => {
                tracing::warn!(error = %e, "retried plan has no SQL translation");
                return None;
            }
        };
        match self.run(&sql) {
            Ok(rows) => {
                tracing::info!(
                    hints = hints.len(),
                    rows = rows.len(),
                    "subject-hint retry executed"
                );
                Some((retried, sql, rows))
            }
            Err(e) => {
                tracing::warn!(error = %e, "retried plan failed to execute");
                None
            }
        }
    }

    fn outcome(
        &self,
        plan: QueryPlan,
        sql: SqlQuery,
        rows: Vec<RowValues>,
        retried: bool,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let rationale = build_rationale(&plan.filters);
        let mut candidates: Vec<Candidate> = rows
            .iter()
            .map(|row| Candidate {
                record_id: row
                    .get("record_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                match_rationale: rationale.clone(),
                evidence: plan
                    .filters
                    .iter()
                    .map(|filter| extract_evidence(filter, row))
                    .collect(),
            })
            .collect();
        candidates.sort_by(|a, b| a.record_id.cmp(&b.record_id));

        let set = CandidateSet {
            query_text: plan.query_text.clone(),
            plan_hash: plan_hash(&plan)?,
            sql: sql.sql.clone(),
            generated_at: Utc::now(),
            total_count: candidates.len(),
            candidates,
        };
        Ok(ExecutionOutcome {
            plan,
            sql,
            candidates: set,
            retried,
        })
    }
}

/// A zero-result plan is retried only if it filters on subject and is not
/// itself a retry.
pub fn qualifies_for_retry(plan: &QueryPlan) -> bool {
    !plan.retry_attempt() && plan.has_filter_on(FilterField::Subject)
}
