//! Advisory warnings about a plan. Never block execution.

use serde::{Deserialize, Serialize};

use bibquery_plan::{Filter, FilterField, FilterValue, QueryPlan};

pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.7;
/// Year spans wider than this many years are flagged.
pub const BROAD_RANGE_YEARS: i32 = 200;
/// Single subject/title tokens shorter than this are flagged.
pub const VAGUE_TOKEN_MIN_CHARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    EmptyFilters,
    LowConfidence,
    BroadDateRange,
    VagueFilter,
    ZeroResults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
    /// Index into `plan.filters` the warning is about, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_index: Option<usize>,
}

impl Warning {
    fn plan(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            filter_index: None,
        }
    }

    fn filter(code: WarningCode, index: usize, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            filter_index: Some(index),
        }
    }
}

fn filter_warnings(index: usize, filter: &Filter) -> Vec<Warning> {
    let mut out = Vec::new();

    if let Some(confidence) = filter.confidence() {
        if confidence < LOW_CONFIDENCE_THRESHOLD {
            out.push(Warning::filter(
                WarningCode::LowConfidence,
                index,
                format!(
                    "the {} filter was inferred with low confidence ({confidence:.2}); check {}",
                    filter.field(),
                    filter.display_value()
                ),
            ));
        }
    }

    if let FilterValue::Range { start, end } = filter.value() {
        if i64::from(*end) - i64::from(*start) > i64::from(BROAD_RANGE_YEARS) {
            out.push(Warning::filter(
                WarningCode::BroadDateRange,
                index,
                format!("the date range {start}-{end} spans more than {BROAD_RANGE_YEARS} years"),
            ));
        }
    }

    if matches!(filter.field(), FilterField::Subject | FilterField::Title) {
        if let Some(text) = filter.text() {
            let mut tokens = text.split_whitespace();
            if let (Some(token), None) = (tokens.next(), tokens.next()) {
                if token.chars().count() < VAGUE_TOKEN_MIN_CHARS {
                    out.push(Warning::filter(
                        WarningCode::VagueFilter,
                        index,
                        format!("the {} term `{token}` is very short and may match too broadly", filter.field()),
                    ));
                }
            }
        }
    }

    out
}

/// Warnings derivable from the plan alone.
pub fn plan_warnings(plan: &QueryPlan) -> Vec<Warning> {
    if plan.filters.is_empty() {
        return vec![Warning::plan(
            WarningCode::EmptyFilters,
            "no filters were recognized; every record in the index matches",
        )];
    }
    plan.filters
        .iter()
        .enumerate()
        .flat_map(|(i, f)| filter_warnings(i, f))
        .collect()
}

pub fn zero_results_warning() -> Warning {
    Warning::plan(
        WarningCode::ZeroResults,
        "no records matched; try removing a filter or widening the date range",
    )
}
