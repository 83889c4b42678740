//! Execution results: candidates and the evidence that justifies them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Proof that one filter matched one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Physical column inspected, `table.column`.
    pub field: String,
    /// Value found in the record (`null` when the record has none).
    pub value: Value,
    pub operator: String,
    /// The filter value, reformatted for display.
    pub matched_against: Value,
    /// Provenance, e.g. `imprints.publisher_norm (marc:264[0])`.
    pub source: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub record_id: String,
    pub match_rationale: String,
    /// One entry per plan filter, in plan order.
    pub evidence: Vec<Evidence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub query_text: String,
    pub plan_hash: String,
    /// The SQL text that produced `candidates`.
    pub sql: String,
    pub generated_at: DateTime<Utc>,
    /// Ascending by `record_id`.
    pub candidates: Vec<Candidate>,
    pub total_count: usize,
}

impl CandidateSet {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn record_ids(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.record_id.as_str()).collect()
    }
}
