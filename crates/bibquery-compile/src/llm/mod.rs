//! LLM-assisted compiler.
//!
//! Flow per request:
//! 1. exact-text lookup in the compile cache (hit: return the cached plan with
//!    the caller's limit, no external call)
//! 2. schema-constrained completion
//! 3. JSON extraction, with one repair re-prompt when the answer is not JSON
//! 4. every filter re-validated through [`Filter`]'s constructor rules
//! 5. cache append (failures logged, never returned)

pub mod prompt;
pub mod providers;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use bibquery_plan::{
    debug_keys, plan_hash, schema::filter_json_schema, CompilationError, Filter, PlanCompiler,
    QueryPlan, SubjectHint, SubjectHintRetry,
};

use crate::cache::CompileCache;
use crate::env::ConfigError;
use providers::{LlmConfig, LlmProvider, LlmRequest};

pub const BACKEND: &str = "llm";

/// Schema of the model's answer. Every key is required so the schema is valid
/// for strict structured-output modes.
pub fn response_json_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "filters": { "type": "array", "items": filter_json_schema() },
            "explanation": { "type": ["string", "null"] },
            "error": { "type": ["string", "null"] }
        },
        "required": ["filters", "explanation", "error"]
    })
}

#[derive(Debug, Deserialize)]
struct PlanResponse {
    #[serde(default)]
    filters: Vec<Value>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Parse the first complete JSON object in `text`.
///
/// Models sometimes wrap JSON in prose or markdown fences; the object is found
/// by brace balancing outside string literals.
pub fn extract_json_object(text: &str) -> Result<Value, String> {
    let trimmed = text.trim();
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(v);
    }

    let Some(start) = trimmed.find('{') else {
        return Err("response is not JSON (no '{' found)".to_string());
    };

    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escape = false;
    let mut end: Option<usize> = None;

    for (offset, ch) in trimmed[start..].char_indices() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + offset);
                    break;
                }
            }
            _ => {}
        }
    }

    let Some(end) = end else {
        return Err("response contains an unterminated JSON object".to_string());
    };
    serde_json::from_str(&trimmed[start..=end]).map_err(|e| format!("response is not valid JSON: {e}"))
}

pub struct LlmCompiler {
    provider: Box<dyn LlmProvider>,
    cache: Option<Arc<CompileCache>>,
    json_repair: bool,
}

impl LlmCompiler {
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self {
            provider,
            cache: None,
            json_repair: true,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.build_provider()?).with_json_repair(config.json_repair))
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CompileCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_json_repair(mut self, enabled: bool) -> Self {
        self.json_repair = enabled;
        self
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// One completion (plus at most one repair re-prompt) turned into a
    /// validated plan without a limit.
    fn request_plan(&self, query_text: &str, user: &str) -> Result<QueryPlan, CompilationError> {
        let system = prompt::system_prompt();
        let schema = response_json_schema();
        let request = LlmRequest {
            system: &system,
            user,
            schema: Some(&schema),
        };

        let text = self.provider.complete(&request)?;
        let doc = match extract_json_object(&text) {
            Ok(doc) => doc,
            Err(err) if self.json_repair => {
                tracing::warn!(provider = self.provider.name(), error = %err, "model response is not JSON; sending repair prompt");
                let repair = prompt::render_json_repair_prompt(user, &text, &err.to_string());
                let repaired = self.provider.complete(&LlmRequest {
                    system: &system,
                    user: &repair,
                    schema: Some(&schema),
                })?;
                extract_json_object(&repaired).map_err(CompilationError::invalid_response)?
            }
            Err(err) => return Err(CompilationError::invalid_response(err)),
        };

        self.plan_from_response(query_text, doc)
    }

    fn plan_from_response(&self, query_text: &str, doc: Value) -> Result<QueryPlan, CompilationError> {
        let response: PlanResponse = serde_json::from_value(doc)
            .map_err(|e| CompilationError::invalid_response(format!("unexpected response shape: {e}")))?;

        if let Some(reason) = response.error.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            return Err(CompilationError::invalid_response(format!(
                "model could not express the question as filters: {reason}"
            )));
        }

        let filters = response
            .filters
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                serde_json::from_value::<Filter>(v)
                    .map_err(|e| CompilationError::invalid_response(format!("filter {i}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut plan = QueryPlan::new(query_text)
            .with_filters(filters)
            .with_debug(debug_keys::BACKEND, BACKEND)
            .with_debug(debug_keys::MODEL, self.provider.model());
        if let Some(explanation) = response.explanation.filter(|e| !e.trim().is_empty()) {
            plan = plan.with_debug(debug_keys::EXPLANATION, explanation);
        }
        Ok(plan)
    }
}

impl PlanCompiler for LlmCompiler {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn compile(&self, query_text: &str, limit: Option<usize>) -> Result<QueryPlan, CompilationError> {
        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.get(query_text) {
                tracing::debug!(query = %query_text, model = %entry.model, "compile cache hit");
                return Ok(entry
                    .plan
                    .with_limit(limit)
                    .with_debug(debug_keys::CACHE_HIT, true));
            }
        }

        let plan = self.request_plan(query_text, &prompt::user_prompt(query_text))?;
        tracing::debug!(query = %query_text, filters = plan.filters.len(), "llm compile");

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(query_text, &plan, self.provider.model()) {
                tracing::warn!(path = %cache.path().display(), error = %err, "failed to append compile cache entry");
            }
        }
        Ok(plan.with_limit(limit))
    }
}

impl SubjectHintRetry for LlmCompiler {
    fn retry_with_subject_hints(
        &self,
        plan: &QueryPlan,
        hints: &[SubjectHint],
    ) -> Result<QueryPlan, CompilationError> {
        let previous = plan_hash(plan)
            .map_err(|e| CompilationError::invalid_response(format!("failed to hash plan: {e}")))?;
        let user = prompt::render_subject_retry_prompt(plan, hints);
        tracing::debug!(query = %plan.query_text, hints = hints.len(), retry_of = %previous, "subject-hint retry");

        Ok(self
            .request_plan(&plan.query_text, &user)?
            .with_limit(plan.limit)
            .with_debug(debug_keys::RETRY_ATTEMPT, true)
            .with_debug(debug_keys::RETRY_HINT_COUNT, hints.len())
            .with_debug(debug_keys::RETRY_OF, previous))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use bibquery_plan::{FilterField, FilterOp};
    use parking_lot::Mutex;

    /// Provider that replays canned answers and records the prompts it saw.
    struct ScriptedProvider {
        answers: Mutex<VecDeque<Result<String, CompilationError>>>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedProvider {
        fn new(answers: Vec<Result<String, CompilationError>>) -> (Self, Arc<Mutex<Vec<String>>>) {
            let prompts = Arc::new(Mutex::new(Vec::new()));
            let provider = Self {
                answers: Mutex::new(answers.into()),
                prompts: prompts.clone(),
            };
            (provider, prompts)
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        fn complete(&self, request: &LlmRequest<'_>) -> Result<String, CompilationError> {
            self.prompts.lock().push(request.user.to_string());
            self.answers
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(CompilationError::invalid_response("no scripted answer left")))
        }
    }

    fn scripted(answers: Vec<Result<String, CompilationError>>) -> (LlmCompiler, Arc<Mutex<Vec<String>>>) {
        let (provider, prompts) = ScriptedProvider::new(answers);
        (LlmCompiler::new(Box::new(provider)), prompts)
    }

    const VENICE: &str = r#"{"filters": [{"field": "place", "op": "equals", "value": "venice", "start": null, "end": null, "negate": false, "confidence": 0.9, "notes": null}], "explanation": "city", "error": null}"#;

    #[test]
    fn valid_response_becomes_plan() {
        let (compiler, prompts) = scripted(vec![Ok(VENICE.to_string())]);
        let plan = compiler.compile("books printed in Venice", Some(20)).unwrap();

        assert_eq!(plan.filters.len(), 1);
        assert_eq!(plan.filters[0].field(), FilterField::Place);
        assert_eq!(plan.filters[0].confidence(), Some(0.9));
        assert_eq!(plan.limit, Some(20));
        assert_eq!(plan.backend(), Some("llm"));
        assert_eq!(plan.debug[debug_keys::MODEL], "scripted-model");
        assert_eq!(plan.debug[debug_keys::EXPLANATION], "city");
        assert_eq!(prompts.lock().len(), 1);
    }

    #[test]
    fn prose_wrapped_json_is_extracted() {
        let wrapped = format!("Here is the plan:\n```json\n{VENICE}\n```\nHope that helps {{:)}}");
        let (compiler, _) = scripted(vec![Ok(wrapped)]);
        let plan = compiler.compile("books printed in Venice", None).unwrap();
        assert_eq!(plan.filters[0].text(), Some("venice"));
    }

    #[test]
    fn non_json_answer_gets_one_repair_prompt() {
        let (compiler, prompts) = scripted(vec![Ok("sure thing!".to_string()), Ok(VENICE.to_string())]);
        let plan = compiler.compile("books printed in Venice", None).unwrap();
        assert_eq!(plan.filters.len(), 1);

        let prompts = prompts.lock();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("could not be parsed as a query plan"));
        assert!(prompts[1].contains("sure thing!"));
    }

    #[test]
    fn repair_can_be_disabled() {
        let (compiler, prompts) = scripted(vec![Ok("nope".to_string()), Ok(VENICE.to_string())]);
        let compiler = compiler.with_json_repair(false);
        let err = compiler.compile("q", None).unwrap_err();
        assert!(matches!(err, CompilationError::InvalidResponse { .. }));
        assert_eq!(prompts.lock().len(), 1);
    }

    #[test]
    fn model_error_and_invalid_filters_are_invalid_responses() {
        let declined = r#"{"filters": [], "explanation": null, "error": "not a catalogue question"}"#;
        let (compiler, _) = scripted(vec![Ok(declined.to_string())]);
        let err = compiler.compile("what's the weather", None).unwrap_err();
        assert!(err.to_string().contains("not a catalogue question"));

        let inverted = r#"{"filters": [{"field": "year", "op": "range", "value": null, "start": 1600, "end": 1500, "negate": false, "confidence": null, "notes": null}]}"#;
        let (compiler, _) = scripted(vec![Ok(inverted.to_string())]);
        let err = compiler.compile("q", None).unwrap_err();
        assert!(matches!(err, CompilationError::InvalidResponse { ref detail } if detail.starts_with("filter 0")));
    }

    #[test]
    fn provider_errors_propagate() {
        let (compiler, _) = scripted(vec![Err(CompilationError::MissingCredentials {
            provider: "openai".into(),
            env_var: "OPENAI_API_KEY".into(),
            detail: "OPENAI_API_KEY is not set".into(),
        })]);
        assert!(matches!(
            compiler.compile("q", None),
            Err(CompilationError::MissingCredentials { .. })
        ));
    }

    #[test]
    fn cache_hit_skips_provider_and_applies_limit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CompileCache::open(dir.path().join("compile.jsonl")).unwrap());

        let (first, _) = scripted(vec![Ok(VENICE.to_string())]);
        let first = first.with_cache(cache.clone());
        let compiled = first.compile("books printed in Venice", Some(5)).unwrap();
        assert!(!compiled.debug.contains_key(debug_keys::CACHE_HIT));
        assert_eq!(cache.get("books printed in Venice").unwrap().plan.limit, None);

        let (second, prompts) = scripted(vec![]);
        let second = second.with_cache(cache);
        let cached = second.compile("books printed in Venice", Some(7)).unwrap();
        assert_eq!(cached.limit, Some(7));
        assert_eq!(cached.debug[debug_keys::CACHE_HIT], true);
        assert_eq!(cached.filters, compiled.filters);
        assert!(prompts.lock().is_empty());
    }

    #[test]
    fn failed_cache_append_still_returns_plan() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CompileCache::open(dir.path().join("compile.jsonl")).unwrap());
        cache.break_appends();

        let (compiler, prompts) = scripted(vec![Ok(VENICE.to_string())]);
        let compiler = compiler.with_cache(cache.clone());
        let plan = compiler.compile("books printed in Venice", Some(3)).unwrap();

        assert_eq!(plan.filters[0].text(), Some("venice"));
        assert_eq!(plan.limit, Some(3));
        assert!(cache.is_empty());
        assert_eq!(prompts.lock().len(), 1);
    }

    #[test]
    fn subject_retry_marks_plan_and_skips_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CompileCache::open(dir.path().join("compile.jsonl")).unwrap());
        let remapped = r#"{"filters": [{"field": "subject", "op": "contains", "value": "alchemy", "start": null, "end": null, "negate": false, "confidence": 0.7, "notes": "remapped"}], "explanation": null, "error": null}"#;
        let (compiler, prompts) = scripted(vec![Ok(remapped.to_string())]);
        let compiler = compiler.with_cache(cache.clone());

        let original = QueryPlan::new("books on alchemical arts")
            .with_filters(vec![Filter::equals(FilterField::Subject, "alchemical arts").unwrap()])
            .with_limit(Some(10));
        let hints = vec![SubjectHint { value: "Alchemy".into(), count: 3 }];
        let retried = compiler.retry_with_subject_hints(&original, &hints).unwrap();

        assert!(retried.retry_attempt());
        assert_eq!(retried.limit, Some(10));
        assert_eq!(retried.filters[0].op(), FilterOp::Contains);
        assert_eq!(retried.debug[debug_keys::RETRY_HINT_COUNT], 1);
        assert_eq!(retried.debug[debug_keys::RETRY_OF], plan_hash(&original).unwrap());
        assert!(prompts.lock()[0].contains("- Alchemy (3)"));
        assert!(cache.is_empty());
    }

    #[test]
    fn extraction_handles_braces_inside_strings() {
        let v = extract_json_object(r#"note: {"a": "}{", "b": {"c": 1}} trailing }"#).unwrap();
        assert_eq!(v["a"], "}{");
        assert_eq!(v["b"]["c"], 1);
        assert!(extract_json_object("no json here").is_err());
        assert!(extract_json_object("{\"a\": 1").is_err());
    }
}
