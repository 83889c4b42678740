//! Canonical plan serialization and the plan hash.
//!
//! Canonical form: compact JSON, object keys sorted lexicographically at every
//! depth. The hash is lowercase hex SHA-256 of those bytes.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::plan::QueryPlan;

/// Serialize any value with sorted keys. Does not rely on `serde_json`'s map
/// ordering, which changes when `preserve_order` is enabled anywhere in the
/// dependency graph.
pub fn canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&sort_keys(value))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn plan_hash(plan: &QueryPlan) -> serde_json::Result<String> {
    Ok(sha256_hex(canonical_json(plan)?.as_bytes()))
}
