//! Per-filter evidence and match rationale.
//!
//! Every candidate carries exactly one [`Evidence`] per plan filter, in plan
//! order; a value the row does not have is reported as `null` rather than
//! dropped.

use std::collections::BTreeMap;

use rusqlite::types::ValueRef;
use rusqlite::Row;
use serde_json::{json, Value};

use bibquery_plan::{normalize_code, Evidence, Filter, FilterField, FilterOp, FilterValue};

use crate::schema::{column_alias, Table};

/// One result row keyed by column alias.
pub type RowValues = BTreeMap<String, Value>;

pub fn read_row(row: &Row<'_>, names: &[String]) -> rusqlite::Result<RowValues> {
    let mut values = RowValues::new();
    for (i, name) in names.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null | ValueRef::Blob(_) => Value::Null,
            ValueRef::Integer(v) => Value::from(v),
            ValueRef::Real(v) => Value::from(v),
            ValueRef::Text(bytes) => Value::from(String::from_utf8_lossy(bytes).into_owned()),
        };
        values.insert(name.clone(), value);
    }
    Ok(values)
}

// ============================================================================
// Evidence
// ============================================================================

struct EvidenceColumn {
    table: Table,
    column: &'static str,
    confidence: Option<&'static str>,
}

fn evidence_column(field: FilterField) -> EvidenceColumn {
    let (table, column, confidence) = match field {
        FilterField::Publisher => (Table::Imprints, "publisher_norm", Some("publisher_confidence")),
        FilterField::Place => (Table::Imprints, "place_norm", Some("place_confidence")),
        FilterField::Country => (Table::Imprints, "country_name", None),
        FilterField::Year => (Table::Imprints, "date_start", Some("date_confidence")),
        FilterField::Language => (Table::Languages, "code", None),
        FilterField::Title => (Table::Titles, "value", None),
        FilterField::Subject => (Table::Subjects, "value", None),
        FilterField::Agent => (Table::Agents, "agent_raw", Some("agent_confidence")),
        FilterField::AgentNorm => (Table::Agents, "agent_norm", Some("agent_confidence")),
        FilterField::AgentRole => (Table::Agents, "role_norm", Some("role_confidence")),
        FilterField::AgentType => (Table::Agents, "agent_type", None),
    };
    EvidenceColumn {
        table,
        column,
        confidence,
    }
}

static NULL: Value = Value::Null;

fn get<'r>(row: &'r RowValues, table: Table, column: &str) -> &'r Value {
    row.get(&column_alias(table, column)).unwrap_or(&NULL)
}

/// Filter value as shown next to the record value.
fn matched_against(filter: &Filter) -> Value {
    match filter.value() {
        FilterValue::Text(v) if filter.field() == FilterField::Year => match v.parse::<i64>() {
            Ok(year) => json!([year, year]),
            Err(_) => Value::from(v.as_str()),
        },
        FilterValue::Text(v) => Value::from(v.as_str()),
        FilterValue::Range { start, end } => json!([start, end]),
        FilterValue::Set(values) => json!(values),
    }
}

fn operator_label(filter: &Filter) -> String {
    if filter.negate() {
        format!("not {}", filter.op())
    } else {
        filter.op().to_string()
    }
}

/// Value of a JSON-typed column; plain strings that are not JSON are kept.
fn json_column(value: &Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

/// Render MARC provenance as `tag[occurrence]`, joining multiple entries with
/// `, `. Accepts `{"tag", "occurrence"}` objects, arrays of those or of
/// strings, and bare tags.
pub fn render_provenance(value: &Value, occurrence: Option<i64>) -> Option<String> {
    let with_occurrence = |tag: &str, occ: Option<i64>| match occ {
        Some(occ) => format!("{tag}[{occ}]"),
        None => tag.to_string(),
    };
    match value {
        Value::Null => None,
        Value::String(tag) if tag.trim().is_empty() => None,
        Value::String(tag) => Some(with_occurrence(tag.trim(), occurrence)),
        Value::Number(n) => Some(with_occurrence(&n.to_string(), occurrence)),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| render_provenance(item, occurrence))
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Object(map) => {
            let tag = map
                .get("tag")
                .or_else(|| map.get("source_tag"))
                .and_then(|t| match t {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })?;
            let occ = map
                .get("occurrence")
                .and_then(Value::as_i64)
                .or(occurrence);
            Some(with_occurrence(&tag, occ))
        }
        Value::Bool(_) => None,
    }
}

fn source_label(table: Table, column: &str, row: &RowValues) -> String {
    let provenance = match table {
        Table::Imprints => render_provenance(
            &json_column(get(row, table, "source_tags")),
            get(row, table, "occurrence").as_i64(),
        ),
        Table::Languages | Table::Titles | Table::Subjects => {
            render_provenance(&json_column(get(row, table, "source")), None)
        }
        Table::Agents => render_provenance(&json_column(get(row, table, "provenance_json")), None),
    };
    match provenance {
        Some(p) => format!("{}.{column} (marc:{p})", table.name()),
        None => format!("{}.{column}", table.name()),
    }
}

fn value_matches(filter: &Filter, value: &Value) -> bool {
    let Some(value) = value.as_str().map(normalize_code) else {
        return false;
    };
    match filter.value() {
        FilterValue::Text(t) if filter.op() == FilterOp::Contains => value.contains(&normalize_code(t)),
        FilterValue::Text(t) => value == normalize_code(t),
        FilterValue::Set(values) => values.iter().any(|t| value == normalize_code(t)),
        FilterValue::Range { .. } => false,
    }
}

/// Country filters match the name or the code; report the code only when it
/// is the one that matched.
fn country_column(filter: &Filter, row: &RowValues) -> &'static str {
    let name = get(row, Table::Imprints, "country_name");
    let code = get(row, Table::Imprints, "country_code");
    if !value_matches(filter, name) && value_matches(filter, code) {
        "country_code"
    } else {
        "country_name"
    }
}

/// Evidence for `filter` from one result row.
pub fn extract_evidence(filter: &Filter, row: &RowValues) -> Evidence {
    let mut target = evidence_column(filter.field());
    if filter.field() == FilterField::Country {
        target.column = country_column(filter, row);
    }
    let confidence = target
        .confidence
        .and_then(|c| get(row, target.table, c).as_f64());

    let (field, value) = match filter.field() {
        FilterField::Year => {
            let start = get(row, Table::Imprints, "date_start");
            let end = get(row, Table::Imprints, "date_end");
            let value = if start.is_null() && end.is_null() {
                Value::Null
            } else {
                json!([start, end])
            };
            ("imprints.date_start..date_end".to_string(), value)
        }
        _ => (
            format!("{}.{}", target.table.name(), target.column),
            get(row, target.table, target.column).clone(),
        ),
    };

    Evidence {
        field,
        value,
        operator: operator_label(filter),
        matched_against: matched_against(filter),
        source: source_label(target.table, target.column, row),
        confidence,
    }
}

// ============================================================================
// Rationale
// ============================================================================

fn rationale_clause(filter: &Filter) -> String {
    let field = filter.field().as_str();
    let body = match (filter.op(), filter.value()) {
        (_, FilterValue::Range { start, end }) => format!("{field}={start}-{end}"),
        (FilterOp::Contains, FilterValue::Text(v)) => format!("{field}~'{v}'"),
        (_, FilterValue::Text(v)) => format!("{field}='{v}'"),
        (_, FilterValue::Set(values)) => {
            let quoted: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
            format!("{field} in ({})", quoted.join(", "))
        }
    };
    if filter.negate() {
        format!("NOT {body}")
    } else {
        body
    }
}

/// One clause per filter, in plan order, joined by ` AND `.
pub fn build_rationale(filters: &[Filter]) -> String {
    filters
        .iter()
        .map(rationale_clause)
        .collect::<Vec<_>>()
        .join(" AND ")
}
