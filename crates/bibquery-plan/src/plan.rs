//! The query plan: the validated intermediate representation every compiler
//! emits and every downstream component consumes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::{Filter, FilterField};

pub const PLAN_VERSION: u32 = 1;

/// Compiler provenance. Free-form, but the keys in [`debug_keys`] have fixed
/// meanings.
pub type PlanDebug = BTreeMap<String, Value>;

pub mod debug_keys {
    /// `"heuristic"` or `"llm"`.
    pub const BACKEND: &str = "backend";
    /// Object: filter family → name of the pattern that matched.
    pub const PATTERNS: &str = "patterns";
    pub const MODEL: &str = "model";
    pub const CACHE_HIT: &str = "cache_hit";
    /// `true` on a plan produced by the subject-hint retry.
    pub const RETRY_ATTEMPT: &str = "retry_attempt";
    pub const RETRY_HINT_COUNT: &str = "retry_hint_count";
    /// Hash of the plan the retry replaced.
    pub const RETRY_OF: &str = "retry_of";
    pub const EXPLANATION: &str = "explanation";
    pub const SWAPPED_YEAR_BOUNDS: &str = "swapped_year_bounds";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    #[serde(default = "default_plan_version")]
    pub version: u32,
    pub query_text: String,
    /// Conjunctive: every filter must hold.
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Carried for future ranking; never enforced.
    #[serde(default)]
    pub soft_filters: Vec<Filter>,
    /// `None` and `Some(0)` both mean unlimited; zero never survives decoding.
    #[serde(default, deserialize_with = "deserialize_limit")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub debug: PlanDebug,
}

fn default_plan_version() -> u32 {
    PLAN_VERSION
}

fn deserialize_limit<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<usize>::deserialize(deserializer)?.filter(|&n| n > 0))
}

impl QueryPlan {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            version: PLAN_VERSION,
            query_text: query_text.into(),
            filters: Vec::new(),
            soft_filters: Vec::new(),
            limit: None,
            debug: PlanDebug::new(),
        }
    }

    #[must_use]
    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn with_soft_filters(mut self, soft_filters: Vec<Filter>) -> Self {
        self.soft_filters = soft_filters;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.filter(|&n| n > 0);
        self
    }

    #[must_use]
    pub fn with_debug(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.debug.insert(key.to_string(), value.into());
        self
    }

    pub fn backend(&self) -> Option<&str> {
        self.debug.get(debug_keys::BACKEND).and_then(Value::as_str)
    }

    pub fn retry_attempt(&self) -> bool {
        self.debug
            .get(debug_keys::RETRY_ATTEMPT)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn has_filter_on(&self, field: FilterField) -> bool {
        self.filters.iter().any(|f| f.field() == field)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Decode a plan, rejecting versions this build does not understand.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let plan: Self = serde_json::from_str(text)?;
        if plan.version != PLAN_VERSION {
            return Err(serde::de::Error::custom(format!(
                "unsupported plan version {} (expected {PLAN_VERSION})",
                plan.version
            )));
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterField;

    fn sample() -> QueryPlan {
        QueryPlan::new("books published by x between 1500 and 1599")
            .with_filters(vec![
                Filter::equals(FilterField::Publisher, "x").unwrap(),
                Filter::range(FilterField::Year, 1500, 1599).unwrap(),
            ])
            .with_limit(Some(50))
            .with_debug(debug_keys::BACKEND, "heuristic")
    }

    #[test]
    fn json_roundtrip_is_stable() {
        let plan = sample();
        let first = serde_json::to_string(&plan).unwrap();
        let back = QueryPlan::from_json(&first).unwrap();
        assert_eq!(back, plan);
        assert_eq!(serde_json::to_string(&back).unwrap(), first);
    }

    #[test]
    fn full_precision_confidence_survives_reload() {
        let plan = QueryPlan::new("q").with_filters(vec![Filter::equals(FilterField::Place, "venice")
            .unwrap()
            .with_confidence(0.9856906946328695)
            .unwrap()]);
        let first = serde_json::to_string(&plan).unwrap();
        let back = QueryPlan::from_json(&first).unwrap();
        assert_eq!(serde_json::to_string(&back).unwrap(), first);
        assert_eq!(crate::plan_hash(&back).unwrap(), crate::plan_hash(&plan).unwrap());
    }

    #[test]
    fn retry_flag_defaults_to_false() {
        let plan = sample();
        assert!(!plan.retry_attempt());
        assert!(plan.with_debug(debug_keys::RETRY_ATTEMPT, true).retry_attempt());
    }

    #[test]
    fn zero_limit_means_unlimited() {
        assert_eq!(sample().with_limit(Some(0)).limit, None);

        let mut v = serde_json::to_value(sample()).unwrap();
        v["limit"] = 0.into();
        assert_eq!(QueryPlan::from_json(&v.to_string()).unwrap().limit, None);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut v = serde_json::to_value(sample()).unwrap();
        v["version"] = 7.into();
        let err = QueryPlan::from_json(&v.to_string()).unwrap_err();
        assert!(err.to_string().contains("unsupported plan version 7"));
    }

    #[test]
    fn missing_optional_sections_default() {
        let plan = QueryPlan::from_json(r#"{"query_text": "books"}"#).unwrap();
        assert_eq!(plan.version, PLAN_VERSION);
        assert!(plan.filters.is_empty());
        assert!(plan.debug.is_empty());
    }
}
