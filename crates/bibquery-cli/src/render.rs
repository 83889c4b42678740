//! Terminal rendering of query results.

use colored::Colorize;
use serde_json::Value;

use bibquery_index::{FacetBucket, FacetCounts, SqlQuery};
use bibquery_plan::{Evidence, QueryPlan};
use bibquery_service::{QueryResult, Warning};

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => "—".to_string(),
        Value::String(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}

pub fn print_plan(plan: &QueryPlan) {
    if plan.filters.is_empty() {
        println!("  {}", "(no filters)".dimmed());
    }
    for filter in &plan.filters {
        match filter.confidence() {
            Some(c) => println!("  {} {} {}", "•".cyan(), filter, format!("({c:.2})").dimmed()),
            None => println!("  {} {}", "•".cyan(), filter),
        }
    }
    for filter in &plan.soft_filters {
        println!("  {} {} {}", "~".dimmed(), filter, "(soft)".dimmed());
    }
    if let Some(limit) = plan.limit {
        println!("  {} limit {limit}", "•".cyan());
    }
}

pub fn print_sql(query: &SqlQuery) {
    println!("{}", query.sql);
    if !query.params.is_empty() {
        println!("{} {}", "params:".dimmed(), query.params_display());
    }
}

fn print_warnings(warnings: &[Warning]) {
    for warning in warnings {
        let code = serde_json::to_value(warning.code)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        println!("{} [{}] {}", "warning:".yellow().bold(), code, warning.message);
    }
}

fn print_evidence(evidence: &Evidence) {
    let confidence = evidence
        .confidence
        .map(|c| format!(" {c:.2}"))
        .unwrap_or_default();
    println!(
        "      {} = {}  {} {}  {}{}",
        evidence.field,
        value_text(&evidence.value),
        evidence.operator.dimmed(),
        value_text(&evidence.matched_against),
        evidence.source.dimmed(),
        confidence.dimmed()
    );
}

fn print_buckets(name: &str, buckets: &[FacetBucket]) {
    if buckets.is_empty() {
        return;
    }
    let parts: Vec<String> = buckets
        .iter()
        .map(|b| format!("{} ({})", b.value, b.count))
        .collect();
    println!("  {:<10} {}", name.bold(), parts.join(", "));
}

fn print_facets(facets: &FacetCounts) {
    println!("{}", "facets".bold());
    print_buckets("place", &facets.place);
    print_buckets("publisher", &facets.publisher);
    print_buckets("language", &facets.language);
    print_buckets("decade", &facets.decade);
    print_buckets("century", &facets.century);
}

pub fn print_result(result: &QueryResult, backend: &str, show_sql: bool) {
    let set = &result.candidates;
    println!(
        "{} {} for \"{}\" {}",
        set.total_count.to_string().green().bold(),
        if set.total_count == 1 { "result" } else { "results" },
        set.query_text,
        format!("({backend}, {} ms, plan {})", result.execution_ms, short_hash(&set.plan_hash)).dimmed()
    );
    if result.retried {
        println!("{} subject remapped against the index vocabulary", "retried:".cyan().bold());
    }
    print_plan(&result.plan);
    print_warnings(&result.warnings);
    if show_sql {
        print_sql(&result.sql);
    }

    for candidate in &set.candidates {
        println!();
        println!("  {}  {}", candidate.record_id.bold(), candidate.match_rationale.dimmed());
        for evidence in &candidate.evidence {
            print_evidence(evidence);
        }
    }

    if let Some(facets) = &result.facets {
        println!();
        print_facets(facets);
    }
}
