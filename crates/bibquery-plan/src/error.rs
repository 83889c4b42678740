//! Error taxonomy shared by every bibquery component.
//!
//! - [`FilterValidationError`]: a filter was built with a value that does not
//!   fit its operator. Raised at construction (including JSON decoding), never
//!   later.
//! - [`CompilationError`]: the LLM-assisted compiler could not produce a plan.
//!   The heuristic compiler never returns this.

use crate::filter::{FilterField, FilterOp};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterValidationError {
    #[error("{field} {op}: value must be a non-empty string")]
    EmptyValue { field: FilterField, op: FilterOp },

    #[error("{field} in: value set must contain at least one non-empty string")]
    EmptySet { field: FilterField },

    #[error("{field} range: start ({start}) must not be greater than end ({end})")]
    InvertedRange { field: FilterField, start: i32, end: i32 },

    #[error("{field} {op}: expected {expected}")]
    ValueShape {
        field: FilterField,
        op: FilterOp,
        expected: &'static str,
    },

    #[error("year {op}: `{value}` is not an integer year")]
    NonNumericYear { op: FilterOp, value: String },

    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("unknown filter field `{0}`")]
    UnknownField(String),

    #[error("unknown filter operator `{0}`")]
    UnknownOperator(String),
}

/// Queries that are known to compile well; shown whenever compilation fails.
pub const EXAMPLE_QUERIES: &[&str] = &[
    "books published by Aldus Manutius between 1495 and 1515",
    "books printed in Venice in the 16th century",
    "Hebrew books printed in Amsterdam from 1650 to 1700",
    "books about Kabbalah",
    "Latin books published in Paris",
];

#[derive(Debug, thiserror::Error)]
pub enum CompilationError {
    #[error("{provider}: credentials are missing or were rejected ({detail})")]
    MissingCredentials {
        provider: String,
        env_var: String,
        detail: String,
    },

    #[error("{provider}: request was rate limited or timed out ({detail})")]
    RateLimitedOrTimeout { provider: String, detail: String },

    #[error("model response could not be turned into a valid plan: {detail}")]
    InvalidResponse { detail: String },
}

impl CompilationError {
    pub fn invalid_response(detail: impl Into<String>) -> Self {
        Self::InvalidResponse {
            detail: detail.into(),
        }
    }

    /// What the operator should do about this failure.
    pub fn remediation(&self) -> String {
        match self {
            Self::MissingCredentials { env_var, .. } => format!(
                "set {env_var} in the environment (or switch to the heuristic compiler with BIBQUERY_COMPILER=heuristic)"
            ),
            Self::RateLimitedOrTimeout { .. } => {
                "wait a moment and retry; raise BIBQUERY_LLM_TIMEOUT_SECS if the model is slow".to_string()
            }
            Self::InvalidResponse { .. } => {
                "rephrase the question with an explicit field (publisher, place, year, language, subject, title)".to_string()
            }
        }
    }

    /// User-facing explanation: what went wrong, how to fix it, and queries
    /// that are known to work. Never contains a backtrace.
    pub fn explain(&self) -> String {
        let mut out = format!("Could not understand the question: {self}.\nTo fix: {}.\n", self.remediation());
        out.push_str("Try for example:\n");
        for example in EXAMPLE_QUERIES {
            out.push_str("  - ");
            out.push_str(example);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explanation_lists_examples_and_remediation() {
        let err = CompilationError::MissingCredentials {
            provider: "openai".to_string(),
            env_var: "OPENAI_API_KEY".to_string(),
            detail: "not set".to_string(),
        };
        let text = err.explain();
        assert!(text.contains("OPENAI_API_KEY"));
        for example in EXAMPLE_QUERIES {
            assert!(text.contains(example));
        }
    }

    #[test]
    fn validation_messages_name_the_rule() {
        let err = FilterValidationError::InvertedRange {
            field: FilterField::Year,
            start: 1600,
            end: 1500,
        };
        assert_eq!(
            err.to_string(),
            "year range: start (1600) must not be greater than end (1500)"
        );
    }
}
