//! Hand-written JSON schema of the plan wire format.
//!
//! Embedded in LLM requests as the structured-output schema. Runtime decoding
//! still goes through serde and [`crate::Filter::new`]; the schema only steers
//! the model.

use serde_json::{json, Value};

use crate::filter::{FilterField, FilterOp};
use crate::plan::PLAN_VERSION;

fn field_names() -> Vec<&'static str> {
    FilterField::ALL.iter().map(|f| f.as_str()).collect()
}

fn op_names() -> Vec<&'static str> {
    FilterOp::ALL.iter().map(|o| o.as_str()).collect()
}

/// Schema of one filter object. Every key is required (nullable where it does
/// not apply) so the schema also satisfies strict structured-output modes.
pub fn filter_json_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "field": { "type": "string", "enum": field_names() },
            "op": { "type": "string", "enum": op_names() },
            "value": {
                "description": "string for equals/contains, array of strings for in, null for range",
                "anyOf": [
                    { "type": "string" },
                    { "type": "array", "items": { "type": "string" } },
                    { "type": "null" }
                ]
            },
            "start": { "description": "range lower bound (inclusive)", "type": ["integer", "null"] },
            "end": { "description": "range upper bound (inclusive)", "type": ["integer", "null"] },
            "negate": { "type": "boolean" },
            "confidence": { "type": ["number", "null"], "minimum": 0, "maximum": 1 },
            "notes": { "type": ["string", "null"] }
        },
        "required": ["field", "op", "value", "start", "end", "negate", "confidence", "notes"]
    })
}

/// Schema of a complete plan document.
pub fn plan_json_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "version": { "type": "integer", "const": PLAN_VERSION },
            "query_text": { "type": "string" },
            "filters": { "type": "array", "items": filter_json_schema() },
            "soft_filters": { "type": "array", "items": filter_json_schema() },
            "limit": { "type": ["integer", "null"], "minimum": 1 },
            "debug": { "type": "object" }
        },
        "required": ["version", "query_text", "filters"]
    })
}
